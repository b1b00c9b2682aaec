//! Content-quality gate run on freshly extracted text. A rejection is treated as a
//! property of the uploaded file: the upload is discarded and the user asked for
//! a new one.

#[derive(Debug, Clone, PartialEq)]
pub enum GateVerdict {
    Accept,
    Reject(String),
}

pub trait ContentGate: Send + Sync {
    fn inspect(&self, text: &str) -> GateVerdict;
}

/// Minimum share of alphabetic characters among non-whitespace characters.
const MIN_ALPHABETIC_RATIO: f64 = 0.4;
/// Maximum share of control or U+FFFD replacement characters.
const MAX_GARBAGE_RATIO: f64 = 0.1;

/// Rejects text that is too short, mostly non-letters, or full of decoding debris
/// (what scanned-image PDFs and corrupt files extract to).
pub struct TextQualityGate {
    pub min_chars: usize,
}

impl ContentGate for TextQualityGate {
    fn inspect(&self, text: &str) -> GateVerdict {
        let trimmed = text.trim();
        let total = trimmed.chars().count();

        if total < self.min_chars {
            return GateVerdict::Reject(format!(
                "only {total} characters of text found, need at least {}",
                self.min_chars
            ));
        }

        let garbage = trimmed
            .chars()
            .filter(|c| *c == '\u{FFFD}' || (c.is_control() && !c.is_whitespace()))
            .count();
        if garbage as f64 / total as f64 > MAX_GARBAGE_RATIO {
            return GateVerdict::Reject("text is mostly unreadable characters".to_string());
        }

        let visible = trimmed.chars().filter(|c| !c.is_whitespace()).count();
        let alphabetic = trimmed.chars().filter(|c| c.is_alphabetic()).count();
        if visible == 0 || (alphabetic as f64 / visible as f64) < MIN_ALPHABETIC_RATIO {
            return GateVerdict::Reject("text does not look like prose".to_string());
        }

        GateVerdict::Accept
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> TextQualityGate {
        TextQualityGate { min_chars: 20 }
    }

    #[test]
    fn test_accepts_short_real_resume_line() {
        assert_eq!(gate().inspect("Jane Doe, Engineer..."), GateVerdict::Accept);
    }

    #[test]
    fn test_rejects_empty_and_whitespace() {
        assert!(matches!(gate().inspect(""), GateVerdict::Reject(_)));
        assert!(matches!(gate().inspect("   \n\t  "), GateVerdict::Reject(_)));
    }

    #[test]
    fn test_rejects_replacement_character_soup() {
        let text = format!("Jane {}", "\u{FFFD}".repeat(40));
        assert!(matches!(gate().inspect(&text), GateVerdict::Reject(_)));
    }

    #[test]
    fn test_rejects_numeric_noise() {
        assert!(matches!(
            gate().inspect("0 0 1 2 3 4 5 6 7 8 9 10 11 12 13 14 15"),
            GateVerdict::Reject(_)
        ));
    }

    #[test]
    fn test_accepts_multilingual_text() {
        assert_eq!(
            gate().inspect("Ingénieure logicielle, Zürich, 8 ans d'expérience"),
            GateVerdict::Accept
        );
    }
}
