//! Paper sizes accepted for PDF output.

use std::fmt;

use serde_json::{Map, Value};

/// Supported paper formats. Anything unrecognized resolves to [`PageSize::A4`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PageSize {
    A0,
    A1,
    A2,
    A3,
    #[default]
    A4,
    A5,
    A6,
    Letter,
    Legal,
    Tabloid,
    Ledger,
}

impl PageSize {
    pub const ALL: [PageSize; 11] = [
        PageSize::A0,
        PageSize::A1,
        PageSize::A2,
        PageSize::A3,
        PageSize::A4,
        PageSize::A5,
        PageSize::A6,
        PageSize::Letter,
        PageSize::Legal,
        PageSize::Tabloid,
        PageSize::Ledger,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PageSize::A0 => "A0",
            PageSize::A1 => "A1",
            PageSize::A2 => "A2",
            PageSize::A3 => "A3",
            PageSize::A4 => "A4",
            PageSize::A5 => "A5",
            PageSize::A6 => "A6",
            PageSize::Letter => "Letter",
            PageSize::Legal => "Legal",
            PageSize::Tabloid => "Tabloid",
            PageSize::Ledger => "Ledger",
        }
    }

    /// Case-insensitive lookup; `None` for unknown names.
    pub fn parse(raw: &str) -> Option<Self> {
        let upper = raw.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|size| size.name().to_ascii_uppercase() == upper)
    }

    /// Resolve the `pageSize` key of a report config. Missing, non-string or
    /// unknown values yield A4.
    pub fn from_config(config: Option<&Map<String, Value>>) -> Self {
        config
            .and_then(|c| c.get("pageSize"))
            .and_then(Value::as_str)
            .and_then(Self::parse)
            .unwrap_or_default()
    }

    /// Paper width and height in inches, as the print request expects them.
    pub fn dimensions_in(&self) -> (f64, f64) {
        match self {
            PageSize::A0 => (33.1, 46.8),
            PageSize::A1 => (23.4, 33.1),
            PageSize::A2 => (16.54, 23.4),
            PageSize::A3 => (11.7, 16.54),
            PageSize::A4 => (8.27, 11.7),
            PageSize::A5 => (5.83, 8.27),
            PageSize::A6 => (4.13, 5.83),
            PageSize::Letter => (8.5, 11.0),
            PageSize::Legal => (8.5, 14.0),
            PageSize::Tabloid => (11.0, 17.0),
            PageSize::Ledger => (17.0, 11.0),
        }
    }
}

impl fmt::Display for PageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn case_insensitive_resolution() {
        assert_eq!(PageSize::from_config(Some(&config(json!({"pageSize": "a3"})))), PageSize::A3);
        assert_eq!(PageSize::from_config(Some(&config(json!({"pageSize": "A3"})))), PageSize::A3);
        assert_eq!(
            PageSize::from_config(Some(&config(json!({"pageSize": "letter"})))),
            PageSize::Letter
        );
        assert_eq!(
            PageSize::from_config(Some(&config(json!({"pageSize": "LEDGER"})))),
            PageSize::Ledger
        );
    }

    #[test]
    fn unknown_or_missing_is_a4() {
        assert_eq!(PageSize::from_config(Some(&config(json!({"pageSize": "Q5"})))), PageSize::A4);
        assert_eq!(PageSize::from_config(Some(&config(json!({"pageSize": 3})))), PageSize::A4);
        assert_eq!(PageSize::from_config(Some(&config(json!({})))), PageSize::A4);
        assert_eq!(PageSize::from_config(None), PageSize::A4);
    }

    #[test]
    fn resolution_is_stable() {
        let c = config(json!({"pageSize": "tabloid"}));
        let first = PageSize::from_config(Some(&c));
        for _ in 0..3 {
            assert_eq!(PageSize::from_config(Some(&c)), first);
        }
    }

    #[test]
    fn legal_geometry() {
        assert_eq!(PageSize::Legal.dimensions_in(), (8.5, 14.0));
        let (w, h) = PageSize::Ledger.dimensions_in();
        assert!(w > h, "Ledger is landscape");
    }
}
