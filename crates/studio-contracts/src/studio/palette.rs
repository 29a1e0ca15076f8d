pub const DEFAULT_BACKGROUND_COLOR: &str = "#f5f5dc";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Swatch {
    pub hex: &'static str,
    pub name: &'static str,
}

pub const PALETTE: &[Swatch] = &[
    Swatch {
        hex: "#f5f5dc",
        name: "Beige",
    },
    Swatch {
        hex: "#FFFFFF",
        name: "White",
    },
    Swatch {
        hex: "#000000",
        name: "Black",
    },
    Swatch {
        hex: "#f0f0f0",
        name: "Light Grey",
    },
    Swatch {
        hex: "#a0a0a0",
        name: "Medium Grey",
    },
    Swatch {
        hex: "#e0bbe4",
        name: "Light Lavender",
    },
    Swatch {
        hex: "#957dad",
        name: "Medium Purple",
    },
    Swatch {
        hex: "#ffd3b5",
        name: "Light Peach",
    },
    Swatch {
        hex: "#ffaaa5",
        name: "Coral",
    },
    Swatch {
        hex: "#ff8b94",
        name: "Salmon",
    },
];

/// Finds a swatch by hex (case-insensitive) or by name (ignoring case and spaces).
pub fn find_swatch(query: &str) -> Option<&'static Swatch> {
    let trimmed = query.trim();
    let squashed = |value: &str| -> String {
        value
            .chars()
            .filter(|ch| !ch.is_whitespace() && *ch != '_' && *ch != '-')
            .collect::<String>()
            .to_ascii_lowercase()
    };
    let wanted = squashed(trimmed);
    PALETTE.iter().find(|swatch| {
        swatch.hex.eq_ignore_ascii_case(trimmed) || squashed(swatch.name) == wanted
    })
}

/// Resolves a user color to a `#rgb`/`#rrggbb` string.
///
/// Swatch names resolve to their hex; custom hex keeps the caller's casing.
pub fn normalize_color(input: &str) -> Option<String> {
    if let Some(swatch) = find_swatch(input) {
        return Some(swatch.hex.to_string());
    }
    let trimmed = input.trim();
    let digits = trimmed.strip_prefix('#').unwrap_or(trimmed);
    if !matches!(digits.len(), 3 | 6) || !digits.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return None;
    }
    Some(format!("#{digits}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_color_is_first_swatch() {
        assert_eq!(PALETTE[0].hex, DEFAULT_BACKGROUND_COLOR);
        assert_eq!(PALETTE.len(), 10);
    }

    #[test]
    fn swatch_lookup_ignores_case() {
        assert_eq!(find_swatch("#ffffff").map(|s| s.name), Some("White"));
        assert_eq!(find_swatch("light grey").map(|s| s.hex), Some("#f0f0f0"));
        assert_eq!(find_swatch("LightLavender").map(|s| s.hex), Some("#e0bbe4"));
        assert!(find_swatch("#123456").is_none());
    }

    #[test]
    fn normalize_color_accepts_hex_and_names() {
        assert_eq!(normalize_color("coral").as_deref(), Some("#ffaaa5"));
        assert_eq!(normalize_color("#FFF").as_deref(), Some("#FFF"));
        assert_eq!(normalize_color("12ab9f").as_deref(), Some("#12ab9f"));
        assert_eq!(normalize_color("#12ab9").as_deref(), None);
        assert_eq!(normalize_color("teal-ish"), None);
    }
}
