// Dance Dance Revolution play data pages
pub mod ddr;

// DANCERUSH JSON endpoints
pub mod drs;
