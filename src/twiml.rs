//! TwiML documents returned to Twilio's voice webhooks

use std::fmt::Write as _;

/// One TwiML verb
#[derive(Debug, Clone, PartialEq, Eq)]
enum Verb {
    Play(String),
    Say(String),
    Pause(u64),
    Record {
        action: String,
        max_length: u32,
        timeout: u32,
        status_callback: String,
    },
    Redirect(String),
    Hangup,
}

/// Builds a `<Response>` document verb by verb
#[derive(Debug, Clone, Default)]
pub struct TwimlBuilder {
    verbs: Vec<Verb>,
}

impl TwimlBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn play(mut self, url: impl Into<String>) -> Self {
        self.verbs.push(Verb::Play(url.into()));
        self
    }

    pub fn say(mut self, text: impl Into<String>) -> Self {
        self.verbs.push(Verb::Say(text.into()));
        self
    }

    /// Twilio rejects zero-length pauses, so those are dropped
    pub fn pause(mut self, seconds: u64) -> Self {
        if seconds > 0 {
            self.verbs.push(Verb::Pause(seconds));
        }
        self
    }

    /// Record the caller and post the result to `action`. Twilio posts the
    /// finished recording's URL to `status_callback` once it is stored.
    pub fn record(
        mut self,
        action: impl Into<String>,
        max_length: u32,
        timeout: u32,
        status_callback: impl Into<String>,
    ) -> Self {
        self.verbs.push(Verb::Record {
            action: action.into(),
            max_length,
            timeout,
            status_callback: status_callback.into(),
        });
        self
    }

    pub fn redirect(mut self, url: impl Into<String>) -> Self {
        self.verbs.push(Verb::Redirect(url.into()));
        self
    }

    pub fn hangup(mut self) -> Self {
        self.verbs.push(Verb::Hangup);
        self
    }

    pub fn build(&self) -> String {
        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Response>");
        for verb in &self.verbs {
            // Writing to a String cannot fail
            let _ = match verb {
                Verb::Play(url) => write!(xml, "<Play>{}</Play>", escape_xml(url)),
                Verb::Say(text) => write!(xml, "<Say>{}</Say>", escape_xml(text)),
                Verb::Pause(seconds) => write!(xml, "<Pause length=\"{seconds}\"/>"),
                Verb::Record {
                    action,
                    max_length,
                    timeout,
                    status_callback,
                } => write!(
                    xml,
                    "<Record action=\"{}\" method=\"POST\" maxLength=\"{max_length}\" timeout=\"{timeout}\" playBeep=\"false\" recordingStatusCallback=\"{}\" recordingStatusCallbackMethod=\"POST\"/>",
                    escape_xml(action),
                    escape_xml(status_callback)
                ),
                Verb::Redirect(url) => {
                    write!(xml, "<Redirect method=\"POST\">{}</Redirect>", escape_xml(url))
                }
                Verb::Hangup => write!(xml, "<Hangup/>"),
            };
        }
        xml.push_str("</Response>");
        xml
    }
}

/// Escape text for XML element content and attribute values
pub fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c => escaped.push(c),
        }
    }
    escaped
}
