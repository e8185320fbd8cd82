use crate::captcha::CaptchaSolver;
use crate::cookie::Cookie;
use crate::error::{Result, ScrapeError};
use crate::fetcher::{build_uri, PageRequest, PageSource};

pub const LOGIN_AUTH_URI: &str = "/gate/p/common/login/api/login_auth.html";

#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub otp: Option<String>,
}

impl Credentials {
    pub fn new(username: &str, password: &str, otp: Option<&str>) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
            otp: otp.map(str::to_string).filter(|o| !o.is_empty()),
        }
    }
}

/// Solves a captcha and submits credentials to obtain a session cookie.
///
/// One call is one attempt. A failed attempt burns its captcha, so retries
/// belong to the caller.
#[derive(Debug, Clone, Default)]
pub struct Authenticator {
    solver: CaptchaSolver,
}

impl Authenticator {
    pub fn new(solver: CaptchaSolver) -> Self {
        Self { solver }
    }

    pub async fn login<S: PageSource + ?Sized>(
        &self,
        source: &S,
        credentials: &Credentials,
    ) -> Result<Cookie> {
        let solution = self.solver.solve(source).await?;
        let captcha = solution.form_value();

        let mut form = vec![
            ("login_id", credentials.username.as_str()),
            ("pass_word", credentials.password.as_str()),
        ];
        if let Some(otp) = credentials.otp.as_deref() {
            form.push(("otp", otp));
        }
        form.push(("captcha", captcha.as_str()));

        let page = source
            .request(PageRequest::post_form(build_uri(LOGIN_AUTH_URI), &form))
            .await?;

        // Wrong credentials, an unsolved captcha and a changed login flow all
        // look the same from here: no cookie comes back.
        let raw = page
            .set_cookies
            .first()
            .ok_or_else(|| ScrapeError::Authentication("no cookie returned".into()))?;
        let cookie = Cookie::parse(raw)
            .ok_or_else(|| ScrapeError::Authentication("unparseable session cookie".into()))?;
        log::info!("logged in as {}", credentials.username);
        Ok(cookie)
    }
}
