//! Artifact identifiers: `YYYYMMDD_HHMMSS_pNNN.jpg`.
//!
//! The page number continues from the highest one already stored.

use chrono::{DateTime, Local};

const EXTENSION: &str = ".jpg";

/// Page number encoded in an identifier, if it has one.
pub fn page_number(id: &str) -> Option<u32> {
    let page = id.split('_').nth(2)?;
    page.strip_suffix(EXTENSION)
        .unwrap_or(page)
        .strip_prefix('p')?
        .parse()
        .ok()
}

/// Next identifier given the identifiers already stored.
///
/// `None` once the page counter is exhausted.
pub fn next_name<'a>(
    existing: impl IntoIterator<Item = &'a str>,
    now: DateTime<Local>,
) -> Option<String> {
    let next_page = match existing
        .into_iter()
        .filter(|id| id.ends_with(EXTENSION))
        .filter_map(page_number)
        .max()
    {
        Some(max) => max.checked_add(1)?,
        None => 1,
    };
    Some(format!("{}_p{:03}{}", now.format("%Y%m%d_%H%M%S"), next_page, EXTENSION))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn noon() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 9, 12, 0, 5).unwrap()
    }

    #[test]
    fn test_first_page() {
        assert_eq!(
            next_name(Vec::<&str>::new(), noon()).as_deref(),
            Some("20240309_120005_p001.jpg")
        );
    }

    #[test]
    fn test_continues_from_highest_page() {
        let existing = [
            "20240301_080000_p007.jpg",
            "20240302_080000_p012.jpg",
            "notes.txt",
            "random.jpg",
        ];
        assert_eq!(
            next_name(existing, noon()).as_deref(),
            Some("20240309_120005_p013.jpg")
        );
    }

    #[test]
    fn test_page_number_parsing() {
        assert_eq!(page_number("20240301_080000_p042.jpg"), Some(42));
        assert_eq!(page_number("20240301_080000_p1000.jpg"), Some(1000));
        assert_eq!(page_number("20240301_080000.jpg"), None);
        assert_eq!(page_number("a_b_pX.jpg"), None);
    }

    #[test]
    fn test_exhausted_page_counter() {
        let existing = ["20240101_000000_p4294967295.jpg"];
        assert_eq!(next_name(existing, noon()), None);

        let below = ["20240101_000000_p4294967294.jpg"];
        assert_eq!(
            next_name(below, noon()).as_deref(),
            Some("20240309_120005_p4294967295.jpg")
        );
    }
}
