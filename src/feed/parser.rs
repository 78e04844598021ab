use anyhow::Result;
use chrono::SecondsFormat;
use feed_rs::parser;

/// One entry extracted from a feed, reduced to the four identity-bearing
/// fields the pipeline consumes.
///
/// Every field is a plain `String`: a missing feed field becomes the empty
/// string so that absence is still part of the deterministic identity input.
#[derive(Debug, Clone)]
pub struct FeedEntry {
    pub title: String,
    pub link: String,
    pub description: String,
    /// RFC 3339 UTC rendering of the entry's published (or updated) date.
    /// Canonicalized so the same entry hashes identically across fetches even
    /// when the feed's textual date formatting is unstable.
    pub published: String,
}

/// Parse RSS/Atom bytes into entries, in feed order.
pub fn parse_feed(bytes: &[u8]) -> Result<Vec<FeedEntry>> {
    let feed = parser::parse(bytes)?;

    let entries: Vec<FeedEntry> = feed
        .entries
        .into_iter()
        .map(|entry| {
            let title = entry.title.map(|t| t.content).unwrap_or_default();
            let link = entry
                .links
                .first()
                .map(|l| l.href.clone())
                .unwrap_or_default();
            let description = entry
                .summary
                .map(|s| s.content)
                .or_else(|| entry.content.and_then(|c| c.body))
                .unwrap_or_default();
            let published = entry
                .published
                .or(entry.updated)
                .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
                .unwrap_or_default();

            FeedEntry {
                title,
                link,
                description,
                published,
            }
        })
        .collect();

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rss_entries_in_order() {
        let rss = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <item>
        <title>First</title>
        <link>https://example.com/1</link>
        <description>One</description>
        <pubDate>Mon, 01 Jan 2024 00:00:00 GMT</pubDate>
    </item>
    <item>
        <title>Second</title>
        <link>https://example.com/2</link>
        <description>Two</description>
        <pubDate>Tue, 02 Jan 2024 00:00:00 GMT</pubDate>
    </item>
</channel></rss>"#;

        let entries = parse_feed(rss.as_bytes()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].title, "First");
        assert_eq!(entries[0].link, "https://example.com/1");
        assert_eq!(entries[0].description, "One");
        assert_eq!(entries[0].published, "2024-01-01T00:00:00Z");
        assert_eq!(entries[1].title, "Second");
    }

    #[test]
    fn test_missing_fields_become_empty_strings() {
        let rss = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <item><guid>bare</guid></item>
</channel></rss>"#;

        let entries = parse_feed(rss.as_bytes()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "");
        assert_eq!(entries[0].link, "");
        assert_eq!(entries[0].description, "");
        assert_eq!(entries[0].published, "");
    }

    #[test]
    fn test_empty_channel_yields_no_entries() {
        let rss = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Empty</title></channel></rss>"#;

        let entries = parse_feed(rss.as_bytes()).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn test_invalid_xml_is_an_error() {
        assert!(parse_feed(b"<not valid xml").is_err());
    }
}
