//! Secret redaction
//!
//! Every secret the resolver comes across (escalation passwords, key passphrases, ssh passwords)
//! is registered with a [SecretSink]. [SecretFilter] replaces registered secrets in any text it
//! filters, [Redacting] applies it to everything a `tracing_subscriber` writer emits.
use once_cell::sync::Lazy;
use std::borrow::Cow;
use std::collections::BTreeSet;
use std::io;
use std::sync::{Arc, PoisonError, RwLock};
use tracing_subscriber::fmt::MakeWriter;

pub const REDACTED: &str = "********";

/// Receives secrets as soon as they are resolved
pub trait SecretSink: Send + Sync {
    fn add_secret(&self, secret: &str);
}

static GLOBAL: Lazy<Arc<SecretFilter>> = Lazy::new(Default::default);

#[derive(Debug, Default)]
pub struct SecretFilter {
    secrets: RwLock<BTreeSet<String>>,
}

impl SecretFilter {
    /// The process-wide filter
    pub fn global() -> Arc<SecretFilter> {
        GLOBAL.clone()
    }

    pub fn len(&self) -> usize {
        self.secrets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replaces every registered secret in `text`
    pub fn filter<'t>(&self, text: &'t str) -> Cow<'t, str> {
        let secrets = self.secrets.read().unwrap_or_else(PoisonError::into_inner);

        // longest first, a secret may contain another one
        let mut ordered: Vec<&String> = secrets.iter().collect();
        ordered.sort_by_key(|secret| std::cmp::Reverse(secret.len()));

        let mut text = Cow::Borrowed(text);
        for secret in ordered {
            if text.contains(secret.as_str()) {
                text = Cow::Owned(text.replace(secret.as_str(), REDACTED));
            }
        }
        text
    }
}

impl SecretSink for SecretFilter {
    fn add_secret(&self, secret: &str) {
        if secret.is_empty() {
            return;
        }

        let mut secrets = self.secrets.write().unwrap_or_else(PoisonError::into_inner);
        if secrets.insert(secret.to_owned()) {
            tracing::trace!(count = secrets.len(), "secret registered");
        }
    }
}

/// [MakeWriter] that runs everything written through a [SecretFilter]
pub struct Redacting<M> {
    make_writer: M,
    filter: Arc<SecretFilter>,
}

impl<M> Redacting<M> {
    pub fn new(make_writer: M, filter: Arc<SecretFilter>) -> Self {
        Self {
            make_writer,
            filter,
        }
    }
}

impl<'a, M: MakeWriter<'a>> MakeWriter<'a> for Redacting<M> {
    type Writer = RedactingWriter<M::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter {
            inner: self.make_writer.make_writer(),
            filter: self.filter.clone(),
        }
    }
}

pub struct RedactingWriter<W> {
    inner: W,
    filter: Arc<SecretFilter>,
}

impl<W: io::Write> io::Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let text = String::from_utf8_lossy(buf);
        self.inner.write_all(self.filter.filter(&text).as_bytes())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn redacts_registered_secrets() {
        let filter = SecretFilter::default();
        assert_eq!(filter.filter("password=s3cret"), "password=s3cret");

        filter.add_secret("s3cret");
        filter.add_secret("");
        assert_eq!(filter.len(), 1);
        assert_eq!(filter.filter("password=s3cret"), "password=********");
    }

    #[test]
    fn longest_secret_first() {
        let filter = SecretFilter::default();
        filter.add_secret("abc");
        filter.add_secret("abcdef");

        assert_eq!(filter.filter("x abcdef y abc"), "x ******** y ********");
    }

    #[test]
    fn concurrent_registration() {
        let filter = Arc::new(SecretFilter::default());
        let handles: Vec<_> = (0..8)
            .map(|index| {
                let filter = filter.clone();
                std::thread::spawn(move || filter.add_secret(&format!("secret-{index}")))
            })
            .collect();
        for handle in handles {
            handle.join().expect("thread must not panic");
        }

        assert_eq!(filter.len(), 8);
    }

    #[test]
    fn writer_redacts() {
        let filter = Arc::new(SecretFilter::default());
        filter.add_secret("hunter2");

        let mut writer = RedactingWriter {
            inner: Vec::new(),
            filter,
        };
        writer.write_all(b"login with hunter2\n").unwrap();

        assert_eq!(String::from_utf8(writer.inner).unwrap(), "login with ********\n");
    }
}
