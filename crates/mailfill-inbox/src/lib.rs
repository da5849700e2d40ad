//! IMAP helpers for pulling the email a form should be filled from.
//!
//! The newest message matching a [`SearchCriteria`] is fetched, parsed with
//! `mailparse`, and flattened into plain text with [`EmailMessage::to_text`].

use std::sync::OnceLock;

use chrono::{Duration, Utc};
use mailparse::MailHeaderMap;
use regex::Regex;

#[derive(Debug, Clone)]
pub struct ImapConfig {
    pub host: String,
    pub port: u16,
    pub tls: bool,
    pub username: String,
    pub password: String,
    pub mailbox: String,
}

impl ImapConfig {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            tls: true,
            username: username.into(),
            password: password.into(),
            mailbox: "INBOX".into(),
        }
    }

    pub fn mailbox(mut self, mailbox: impl Into<String>) -> Self {
        self.mailbox = mailbox.into();
        self
    }

    pub fn tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct SearchCriteria {
    pub from: Option<String>,
    pub subject_contains: Option<String>,
    pub unseen_only: bool,
    pub since_minutes: Option<i64>,
    pub mark_seen: bool,
}

impl SearchCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from(mut self, v: impl Into<String>) -> Self {
        self.from = Some(v.into());
        self
    }

    pub fn subject_contains(mut self, v: impl Into<String>) -> Self {
        self.subject_contains = Some(v.into());
        self
    }

    pub fn unseen_only(mut self, v: bool) -> Self {
        self.unseen_only = v;
        self
    }

    pub fn since_minutes(mut self, v: i64) -> Self {
        self.since_minutes = Some(v);
        self
    }

    pub fn mark_seen(mut self, v: bool) -> Self {
        self.mark_seen = v;
        self
    }
}

#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub uid: u32,
    pub subject: Option<String>,
    pub from: Option<String>,
    pub date: Option<String>,
    pub body_text: Option<String>,
    pub body_html: Option<String>,
}

impl EmailMessage {
    /// Body as plain text: the `text/plain` part when present, otherwise the
    /// HTML part with markup stripped.
    pub fn body(&self) -> Option<String> {
        if let Some(text) = self.body_text.as_deref().filter(|t| !t.trim().is_empty()) {
            return Some(text.trim().to_string());
        }
        self.body_html.as_deref().map(html_to_text)
    }

    /// Headers and body rendered the way a person would paste the email.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        if let Some(ref from) = self.from {
            out.push_str(&format!("From: {}\n", from));
        }
        if let Some(ref date) = self.date {
            out.push_str(&format!("Date: {}\n", date));
        }
        if let Some(ref subject) = self.subject {
            out.push_str(&format!("Subject: {}\n", subject));
        }
        if let Some(body) = self.body() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&body);
        }
        out
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IMAP error: {0}")]
    Imap(#[from] imap::Error),
    #[error("TLS error: {0}")]
    Tls(#[from] native_tls::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] mailparse::MailParseError),
    #[error("No message found")]
    NotFound,
    #[cfg(feature = "async")]
    #[error("Join error: {0}")]
    Join(String),
}

pub type Result<T> = std::result::Result<T, Error>;

pub struct ImapClient {
    session: imap::Session<imap::Connection>,
}

impl Drop for ImapClient {
    fn drop(&mut self) {
        let _ = self.session.logout();
    }
}

impl ImapClient {
    pub fn connect(config: &ImapConfig) -> Result<Self> {
        let mut builder = imap::ClientBuilder::new(&config.host, config.port);
        if config.tls {
            builder = builder.mode(imap::ConnectionMode::AutoTls);
        } else {
            builder = builder.mode(imap::ConnectionMode::Plaintext);
        }

        let client = builder.connect()?;

        let mut session = client
            .login(&config.username, &config.password)
            .map_err(|e| e.0)?;

        session.select(&config.mailbox)?;

        Ok(Self { session })
    }

    /// Newest message matching `criteria`, or `None` when the search is empty.
    pub fn fetch_latest(&mut self, criteria: &SearchCriteria) -> Result<Option<EmailMessage>> {
        let query = build_search_query(criteria);
        let uids = self.session.uid_search(query)?;
        let uid = match uids.iter().max() {
            Some(u) => *u,
            None => return Ok(None),
        };

        let fetches = self.session.uid_fetch(uid.to_string(), "RFC822")?;
        let fetch = fetches.iter().next().ok_or(Error::NotFound)?;
        let raw = fetch.body().ok_or(Error::NotFound)?;
        let msg = parse_message(uid, raw)?;

        if criteria.mark_seen {
            let _ = self.session.uid_store(uid.to_string(), "+FLAGS (\\Seen)");
        }

        Ok(Some(msg))
    }
}

fn build_search_query(criteria: &SearchCriteria) -> String {
    let mut parts: Vec<String> = Vec::new();

    if criteria.unseen_only {
        parts.push("UNSEEN".into());
    }

    if let Some(ref from) = criteria.from {
        parts.push(format!("FROM \"{}\"", escape_imap(from)));
    }

    if let Some(ref subject) = criteria.subject_contains {
        parts.push(format!("SUBJECT \"{}\"", escape_imap(subject)));
    }

    if let Some(minutes) = criteria.since_minutes {
        let since = Utc::now() - Duration::minutes(minutes);
        parts.push(format!("SINCE {}", since.format("%d-%b-%Y")));
    }

    if parts.is_empty() {
        "ALL".to_string()
    } else {
        parts.join(" ")
    }
}

fn escape_imap(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_control())
        .flat_map(|c| match c {
            '\\' => vec!['\\', '\\'],
            '"' => vec!['\\', '"'],
            other => vec![other],
        })
        .collect()
}

fn parse_message(uid: u32, raw: &[u8]) -> Result<EmailMessage> {
    let parsed = mailparse::parse_mail(raw)?;

    let headers = parsed.get_headers();
    let subject = headers.get_first_value("Subject");
    let from = headers.get_first_value("From");
    let date = headers.get_first_value("Date");

    let mut body_text: Option<String> = None;
    let mut body_html: Option<String> = None;

    // Walk nested multiparts depth-first; the first plain and html parts win.
    let mut stack = vec![&parsed];
    while let Some(part) = stack.pop() {
        if part.subparts.is_empty() {
            let ct = part.ctype.mimetype.to_lowercase();
            if ct == "text/html" {
                if body_html.is_none() {
                    body_html = Some(part.get_body()?);
                }
            } else if (ct == "text/plain" || ct.is_empty()) && body_text.is_none() {
                body_text = Some(part.get_body()?);
            }
        } else {
            stack.extend(part.subparts.iter().rev());
        }
    }

    Ok(EmailMessage {
        uid,
        subject,
        from,
        date,
        body_text,
        body_html,
    })
}

struct HtmlPatterns {
    hidden: Regex,
    breaks: Regex,
    tags: Regex,
    blank_lines: Regex,
}

fn html_patterns() -> &'static HtmlPatterns {
    static PATTERNS: OnceLock<HtmlPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| HtmlPatterns {
        hidden: Regex::new(r"(?is)<(script|style|head)\b.*?</(script|style|head)\s*>")
            .expect("static regex"),
        breaks: Regex::new(r"(?i)<br\s*/?>|</(p|div|li|tr|h[1-6])\s*>").expect("static regex"),
        tags: Regex::new(r"(?s)<[^>]*>").expect("static regex"),
        blank_lines: Regex::new(r"\n{3,}").expect("static regex"),
    })
}

/// Strip markup from an HTML body, keeping block boundaries as line breaks.
pub fn html_to_text(html: &str) -> String {
    let p = html_patterns();
    let text = p.hidden.replace_all(html, "");
    let text = p.breaks.replace_all(&text, "\n");
    let text = p.tags.replace_all(&text, "");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    let lines: Vec<&str> = text.lines().map(str::trim).collect();
    p.blank_lines
        .replace_all(&lines.join("\n"), "\n\n")
        .trim()
        .to_string()
}

#[cfg(feature = "async")]
pub mod async_client {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// `ImapClient` driven from a blocking task so it can sit inside a tokio flow.
    pub struct AsyncImapClient {
        inner: Arc<Mutex<ImapClient>>,
    }

    impl AsyncImapClient {
        pub async fn connect(config: &ImapConfig) -> Result<Self> {
            let cfg = config.clone();
            let client = tokio::task::spawn_blocking(move || ImapClient::connect(&cfg))
                .await
                .map_err(|e| Error::Join(e.to_string()))??;
            Ok(Self {
                inner: Arc::new(Mutex::new(client)),
            })
        }

        pub async fn fetch_latest(
            &mut self,
            criteria: &SearchCriteria,
        ) -> Result<Option<EmailMessage>> {
            let criteria = criteria.clone();
            let inner = self.inner.clone();
            tokio::task::spawn_blocking(move || {
                let mut guard = inner
                    .lock()
                    .map_err(|e| Error::Join(format!("imap client lock poisoned: {}", e)))?;
                guard.fetch_latest(&criteria)
            })
            .await
            .map_err(|e| Error::Join(e.to_string()))?
        }
    }
}

#[cfg(feature = "async")]
pub use async_client::AsyncImapClient;
