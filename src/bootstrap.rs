//! Example mails and the startup hook that seeds them.

use tracing::{info, warn};

use crate::config::BootstrapConfig;
use crate::error::Result;
use crate::parser::envelope;
use crate::store::MailStore;

/// Example messages shipped with the binary, as `(name, source)`.
pub const EXAMPLE_MAILS: &[(&str, &[u8])] = &[
    ("plain", include_bytes!("../demos/plain.eml")),
    ("html", include_bytes!("../demos/html.eml")),
    ("inline_image", include_bytes!("../demos/inline_image.eml")),
    ("attachment", include_bytes!("../demos/attachment.eml")),
];

/// Seed `store` with the example mails when `create_examples` is set.
///
/// Meant to run once at process start. Returns how many mails were saved.
pub fn run_startup_hook(config: &BootstrapConfig, store: &dyn MailStore) -> Result<usize> {
    if !config.create_examples {
        info!("Example mails disabled");
        return Ok(0);
    }

    let mut saved = 0;
    for (name, source) in EXAMPLE_MAILS {
        match envelope::capture(source) {
            Ok(message) => {
                let stored = store.save(message)?;
                info!(example = name, id = stored.id, "Created example mail");
                saved += 1;
            }
            Err(e) => warn!(example = name, error = %e, "Skipping broken example mail"),
        }
    }
    Ok(saved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::body::parse_message_body;
    use crate::store::MemoryStore;

    #[test]
    fn test_hook_seeds_every_example() {
        let store = MemoryStore::new();
        let saved = run_startup_hook(&BootstrapConfig::default(), &store).unwrap();
        assert_eq!(saved, EXAMPLE_MAILS.len());
        assert_eq!(store.len(), EXAMPLE_MAILS.len());
    }

    #[test]
    fn test_hook_respects_flag() {
        let store = MemoryStore::new();
        let config = BootstrapConfig {
            create_examples: false,
            ..BootstrapConfig::default()
        };
        assert_eq!(run_startup_hook(&config, &store).unwrap(), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_examples_extract_cleanly() {
        for (name, source) in EXAMPLE_MAILS {
            let body = parse_message_body(source).unwrap();
            assert!(
                !body.plain_text.is_empty() || !body.html.is_empty(),
                "{name} has no text"
            );
        }
    }

    #[test]
    fn test_inline_image_example_resolves() {
        let (_, source) = EXAMPLE_MAILS[2];
        let body = parse_message_body(source).unwrap();
        let image = body
            .find_by_content_id("1367760625.51865ef16e3f6@swift.generated")
            .unwrap();
        assert_eq!(image.filename, "bg1.png");
        assert_eq!(image.mime_type, "image/png");
        assert!(image.data.starts_with(b"\x89PNG"));
    }

    #[test]
    fn test_attachment_example_filename_is_decoded() {
        let (_, source) = EXAMPLE_MAILS[3];
        let body = parse_message_body(source).unwrap();
        assert_eq!(body.attachments.len(), 1);
        assert_eq!(body.attachments[0].filename, "example.pdf");
        assert!(body.attachments[0].data.starts_with(b"%PDF"));
    }
}
