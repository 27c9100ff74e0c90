//! Log initialisation with secret redaction.
//!
//! Every line written by the fmt layer passes through [`RedactingWriter`], so
//! Slack tokens and analysis API keys never reach stderr even when a request
//! URL or header dump is logged at debug level.

use regex::Regex;
use std::io::{self, Write};
use std::sync::Arc;
use tracing_subscriber::{prelude::*, EnvFilter};

/// Crates whose chatter is capped at `warn` regardless of the base level
const QUIET_TARGETS: &[&str] = &[
    "hyper",
    "hyper_util",
    "reqwest",
    "rustls",
    "tungstenite",
    "tokio_tungstenite",
];

/// Regex patterns for redacting sensitive data
pub struct RedactionPatterns {
    slack_token: Regex,
    bearer: Regex,
    api_key_header: Regex,
}

impl RedactionPatterns {
    /// Initialize all regex patterns
    ///
    /// # Errors
    ///
    /// Returns an error if any regex pattern is invalid
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            slack_token: Regex::new(r"xox[abpr]-[A-Za-z0-9-]+|xapp-[A-Za-z0-9-]+")?,
            bearer: Regex::new(r"(?i)(bearer\s+)[A-Za-z0-9._~+/=-]+")?,
            api_key_header: Regex::new(r#"(?i)(x-api-key"?\s*[:=]\s*"?)[^\s",}]+"#)?,
        })
    }

    /// Mask every secret found in `input`
    #[must_use]
    pub fn redact(&self, input: &str) -> String {
        let output = self.slack_token.replace_all(input, "[SLACK_TOKEN]");
        let output = self.bearer.replace_all(&output, "${1}[MASKED]");
        let output = self.api_key_header.replace_all(&output, "${1}[MASKED]");
        output.into_owned()
    }
}

struct RedactingWriter<W: Write> {
    inner: W,
    patterns: Arc<RedactionPatterns>,
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = String::from_utf8_lossy(buf);
        let redacted = self.patterns.redact(&s);
        self.inner.write_all(redacted.as_bytes())?;
        // Report the original length; the redacted text may differ in size
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct RedactingMakeWriter<F> {
    make_inner: F,
    patterns: Arc<RedactionPatterns>,
}

impl<'a, F, W> tracing_subscriber::fmt::MakeWriter<'a> for RedactingMakeWriter<F>
where
    F: Fn() -> W + 'static,
    W: Write,
{
    type Writer = RedactingWriter<W>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter {
            inner: (self.make_inner)(),
            patterns: Arc::clone(&self.patterns),
        }
    }
}

/// Build the filter: `RUST_LOG` wins, otherwise `base_level` with noisy
/// transport crates capped at `warn`.
#[must_use]
pub fn build_filter(base_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let mut directives = vec![base_level.to_string()];
        directives.extend(QUIET_TARGETS.iter().map(|target| format!("{target}=warn")));
        EnvFilter::new(directives.join(","))
    })
}

/// Install the global subscriber writing redacted lines to stderr.
pub fn init_logging(patterns: Arc<RedactionPatterns>, base_level: &str) {
    let make_writer = RedactingMakeWriter {
        make_inner: io::stderr,
        patterns,
    };

    let _ = tracing_subscriber::registry()
        .with(build_filter(base_level))
        .with(tracing_subscriber::fmt::layer().with_writer(make_writer))
        .try_init();
}
