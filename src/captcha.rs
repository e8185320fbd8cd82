//! Image captcha solver for the portal login.
//!
//! A challenge shows one "correct" character picture and a row of choice
//! pictures. Pictures are recognised by the MD5 of their bytes against a
//! table of known images; the answer lists the keys of every choice showing
//! the same character as the correct picture.

use md5::{Digest, Md5};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;

use crate::error::{Result, ScrapeError};
use crate::fetcher::{build_uri, fetch_page, PageSource};

pub const CAPTCHA_GENERATE_URI: &str = "/gate/p/common/login/api/kcaptcha_generate.html";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptchaLabel {
    Bomberman,
    Goemon,
    Twinbee,
    Shiori,
    Louie,
}

impl fmt::Display for CaptchaLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CaptchaLabel::Bomberman => "bomberman",
            CaptchaLabel::Goemon => "goemon",
            CaptchaLabel::Twinbee => "twinbee",
            CaptchaLabel::Shiori => "shiori",
            CaptchaLabel::Louie => "louie",
        };
        f.write_str(name)
    }
}

const KNOWN_IMAGES: &[(&str, CaptchaLabel)] = &[
    ("0753041e08cfa0b322182a1c90647f42", CaptchaLabel::Bomberman),
    ("3aea602a1fb82b86df00832599e99550", CaptchaLabel::Bomberman),
    ("4f303172009ec741ad86fc08646245a0", CaptchaLabel::Bomberman),
    ("71d44daa0af15ee66d35df6b6a55f73f", CaptchaLabel::Bomberman),
    ("a0c115ed425765d3ceb36b1bec8c5c5f", CaptchaLabel::Bomberman),
    ("b4df277bc8057f92257e06f94c1d6321", CaptchaLabel::Bomberman),
    ("be70c62be274742771ad0d6198b918d3", CaptchaLabel::Bomberman),
    ("1125bf23bfd6f8ceab1fe91ae1cf2a54", CaptchaLabel::Goemon),
    ("222114e728406f87493b88ae388a4440", CaptchaLabel::Goemon),
    ("39eb3b335122337be84d3b591855966c", CaptchaLabel::Goemon),
    ("93c6c1721f6f8475c502a1237f3c99d5", CaptchaLabel::Goemon),
    ("964810d74f7cae311dfe39f2f505b3ef", CaptchaLabel::Goemon),
    ("96ee4dbc156c6a8948dde32783d852c8", CaptchaLabel::Goemon),
    ("f4d24a8cec9c334318d6590a86e6c349", CaptchaLabel::Goemon),
    ("26000240431f6ec78bfcb76dd493a0d9", CaptchaLabel::Twinbee),
    ("32908c88748bc6097129c67255a28ae8", CaptchaLabel::Twinbee),
    ("5de00f3d6d6d8d5b378da307bc1245f9", CaptchaLabel::Twinbee),
    ("9bc7769709fb3ea9dfde557114a4fafc", CaptchaLabel::Twinbee),
    ("bfb0932cce45d2bfa132ca05367309e8", CaptchaLabel::Twinbee),
    ("272a461ba9b6f69ce6de8ef0670b2679", CaptchaLabel::Shiori),
    ("35bc09b719c0ff075097d94733fd712e", CaptchaLabel::Shiori),
    ("5cd8a16750d3193d91b97ff26d9805f9", CaptchaLabel::Shiori),
    ("9eeddbe6cc1c4e32765ddfb5dafc309c", CaptchaLabel::Shiori),
    ("be03cce419a71f81fc43af1c71f47cc1", CaptchaLabel::Shiori),
    ("eaa1c324db9a0db9e782ecf7cfffdf4f", CaptchaLabel::Shiori),
    ("37116d63462ef81fe3b72ec57ede3f13", CaptchaLabel::Louie),
    ("39d0b10cb1fd3f12d310efd07323b873", CaptchaLabel::Louie),
    ("568bce3bcb8c5a19fefca1c50934b12e", CaptchaLabel::Louie),
    ("7d3132668987d9155363bab78d27e7f4", CaptchaLabel::Louie),
    ("b12704c2939f55b66f47d53f6d61af15", CaptchaLabel::Louie),
    ("ce734d5ec8b46a7a333609e6dd864f93", CaptchaLabel::Louie),
];

#[derive(Deserialize)]
struct ChallengeEnvelope {
    data: ChallengeData,
}

#[derive(Deserialize)]
struct ChallengeData {
    correct_pic: String,
    kcsess: String,
    #[serde(rename = "choicelist", default)]
    choice_list: Vec<ChoiceData>,
}

#[derive(Deserialize)]
struct ChoiceData {
    key: String,
    #[serde(default)]
    img_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptchaChoice {
    pub key: String,
    pub image_url: String,
}

/// A single-use challenge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptchaChallenge {
    pub session: String,
    pub correct_image_url: String,
    pub choices: Vec<CaptchaChoice>,
}

impl CaptchaChallenge {
    pub fn from_json(json: &str) -> Result<Self> {
        let envelope: ChallengeEnvelope = serde_json::from_str(json)?;
        let data = envelope.data;
        if data.kcsess.is_empty() || data.correct_pic.is_empty() {
            return Err(ScrapeError::shape("captcha challenge without session or picture"));
        }
        Ok(Self {
            session: data.kcsess,
            correct_image_url: data.correct_pic,
            choices: data
                .choice_list
                .into_iter()
                .map(|c| CaptchaChoice { key: c.key, image_url: c.img_url })
                .collect(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptchaSolution {
    pub session: String,
    pub answer: String,
}

impl CaptchaSolution {
    /// Value of the login form's `captcha` field
    pub fn form_value(&self) -> String {
        format!("k_{}{}", self.session, self.answer)
    }
}

/// Maps image hashes to character labels
#[derive(Debug, Clone)]
pub struct CaptchaTable {
    labels: HashMap<String, CaptchaLabel>,
}

impl CaptchaTable {
    pub fn new(entries: impl IntoIterator<Item = (String, CaptchaLabel)>) -> Self {
        Self { labels: entries.into_iter().collect() }
    }

    pub fn label(&self, hash: &str) -> Option<CaptchaLabel> {
        self.labels.get(hash).copied()
    }
}

impl Default for CaptchaTable {
    fn default() -> Self {
        Self::new(KNOWN_IMAGES.iter().map(|(hash, label)| (hash.to_string(), *label)))
    }
}

pub fn md5_hex(bytes: &[u8]) -> String {
    format!("{:x}", Md5::digest(bytes))
}

#[derive(Debug, Clone, Default)]
pub struct CaptchaSolver {
    table: CaptchaTable,
}

impl CaptchaSolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(table: CaptchaTable) -> Self {
        Self { table }
    }

    /// Fetch a fresh challenge and solve it
    pub async fn solve<S: PageSource + ?Sized>(&self, source: &S) -> Result<CaptchaSolution> {
        let page = fetch_page(source, &build_uri(CAPTCHA_GENERATE_URI)).await?;
        let challenge = CaptchaChallenge::from_json(&page.text())?;
        self.solve_challenge(source, &challenge).await
    }

    pub async fn solve_challenge<S: PageSource + ?Sized>(
        &self,
        source: &S,
        challenge: &CaptchaChallenge,
    ) -> Result<CaptchaSolution> {
        let correct_hash = image_hash(source, &challenge.correct_image_url).await?;
        let correct = self
            .table
            .label(&correct_hash)
            .ok_or_else(|| ScrapeError::UnknownCaptchaImage { hash: correct_hash.clone() })?;
        log::debug!("captcha asks for {}", correct);

        let mut answer = String::new();
        for choice in &challenge.choices {
            answer.push('_');
            if choice.image_url.is_empty() {
                continue;
            }
            let hash = image_hash(source, &choice.image_url).await?;
            match self.table.label(&hash) {
                Some(label) if label == correct => answer.push_str(&choice.key),
                Some(_) => {}
                None => log::warn!("unknown captcha choice {} (md5 {})", choice.key, hash),
            }
        }

        Ok(CaptchaSolution { session: challenge.session.clone(), answer })
    }
}

async fn image_hash<S: PageSource + ?Sized>(source: &S, url: &str) -> Result<String> {
    let page = fetch_page(source, url).await?;
    Ok(md5_hex(&page.body))
}
