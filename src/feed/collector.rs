use std::collections::HashSet;
use thiserror::Error;

use super::opml;
use crate::config::SourcesConfig;

#[derive(Debug, Error)]
pub enum CollectError {
    /// Neither the feed list nor any OPML file yielded a URL.
    #[error("No feed URLs found in any source")]
    NoFeedSourcesFound,
}

/// Insertion-ordered set of URLs, deduplicated by exact string.
#[derive(Debug, Default)]
struct UrlList {
    seen: HashSet<String>,
    urls: Vec<String>,
}

impl UrlList {
    fn extend<I: IntoIterator<Item = String>>(&mut self, urls: I) -> usize {
        let before = self.urls.len();
        for url in urls {
            if self.seen.insert(url.clone()) {
                self.urls.push(url);
            }
        }
        self.urls.len() - before
    }
}

/// Extracts feed URLs from line-delimited text. Lines are trimmed; empty
/// lines and `#` comments are dropped.
pub fn parse_feed_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Gathers feed URLs from the feed list and then every OPML file, in
/// priority order.
///
/// Unreadable or malformed sources are logged and skipped. Only an empty
/// overall result is an error.
pub async fn collect_urls(sources: &SourcesConfig) -> Result<Vec<String>, CollectError> {
    let mut list = UrlList::default();

    match tokio::fs::read_to_string(&sources.feed_list).await {
        Ok(text) => {
            let added = list.extend(parse_feed_list(&text));
            tracing::info!(path = %sources.feed_list.display(), added = added, "Read feed list");
        }
        Err(e) => {
            tracing::warn!(path = %sources.feed_list.display(), error = %e, "Skipping feed list");
        }
    }

    for (index, path) in sources.opml.iter().enumerate() {
        match opml::read_feed_urls(path).await {
            Ok(urls) => {
                let added = list.extend(urls);
                tracing::info!(path = %path.display(), added = added, "Read OPML source");
            }
            Err(opml::OpmlError::Io(e))
                if index == 0 && e.kind() == std::io::ErrorKind::NotFound =>
            {
                tracing::info!(path = %path.display(), "Primary OPML source not present");
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Skipping OPML source");
            }
        }
    }

    if list.urls.is_empty() {
        return Err(CollectError::NoFeedSourcesFound);
    }

    tracing::info!(total = list.urls.len(), "Collected feed URLs");
    Ok(list.urls)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::path::Path;

    fn sources(dir: &Path, opml: &[&str]) -> SourcesConfig {
        SourcesConfig {
            feed_list: dir.join("feeds.txt"),
            opml: opml.iter().map(|name| dir.join(name)).collect(),
        }
    }

    #[test]
    fn test_parse_feed_list_skips_comments_and_blanks() {
        let text = "https://a.example/feed.xml\n# comment\n\nhttps://b.example/feed.xml";
        assert_eq!(
            parse_feed_list(text),
            vec!["https://a.example/feed.xml", "https://b.example/feed.xml"]
        );
    }

    #[test]
    fn test_parse_feed_list_trims_lines() {
        let text = "  https://a.example/feed.xml  \r\n\t# indented comment\n   \n";
        assert_eq!(parse_feed_list(text), vec!["https://a.example/feed.xml"]);
    }

    #[tokio::test]
    async fn test_text_before_opml_and_dedup() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("feeds.txt"),
            "https://a.example/rss\nhttps://b.example/rss\nhttps://a.example/rss\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("main.opml"),
            r#"<opml><body>
                <outline xmlUrl="https://b.example/rss"/>
                <outline xmlUrl="https://c.example/rss"/>
            </body></opml>"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("extra.opml"),
            r#"<opml><body><outline xmlUrl="https://d.example/rss"/></body></opml>"#,
        )
        .unwrap();

        let urls = collect_urls(&sources(dir.path(), &["main.opml", "extra.opml"]))
            .await
            .unwrap();
        assert_eq!(
            urls,
            vec![
                "https://a.example/rss",
                "https://b.example/rss",
                "https://c.example/rss",
                "https://d.example/rss",
            ]
        );
    }

    #[tokio::test]
    async fn test_dedup_is_exact_string() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("feeds.txt"),
            "https://a.example/rss\nhttps://a.example/rss/\nHTTPS://A.EXAMPLE/rss\n",
        )
        .unwrap();

        let urls = collect_urls(&sources(dir.path(), &[])).await.unwrap();
        assert_eq!(urls.len(), 3);
    }

    #[tokio::test]
    async fn test_broken_opml_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.opml"), "<opml><body><outline></oops>").unwrap();
        std::fs::write(
            dir.path().join("good.opml"),
            r#"<opml><body><outline xmlUrl="https://good.example/rss"/></body></opml>"#,
        )
        .unwrap();

        let urls = collect_urls(&sources(dir.path(), &["missing.opml", "broken.opml", "good.opml"]))
            .await
            .unwrap();
        assert_eq!(urls, vec!["https://good.example/rss"]);
    }

    #[tokio::test]
    async fn test_no_sources_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let result = collect_urls(&sources(dir.path(), &["podcasts.opml"])).await;
        assert!(matches!(result, Err(CollectError::NoFeedSourcesFound)));
    }

    #[tokio::test]
    async fn test_all_sources_empty_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("feeds.txt"), "# nothing yet\n\n").unwrap();
        std::fs::write(
            dir.path().join("podcasts.opml"),
            r#"<opml><body><outline text="Empty folder"/></body></opml>"#,
        )
        .unwrap();

        let result = collect_urls(&SourcesConfig {
            feed_list: dir.path().join("feeds.txt"),
            opml: vec![dir.path().join("podcasts.opml")],
        })
        .await;
        assert!(matches!(result, Err(CollectError::NoFeedSourcesFound)));
    }

    proptest! {
        #[test]
        fn prop_blank_and_comment_lines_never_collected(
            lines in prop::collection::vec(
                prop_oneof![
                    Just(String::new()),
                    "[ \t]{0,4}",
                    "[ \t]{0,2}#[ -~]{0,20}",
                    "https://[a-z]{1,10}\\.example/[a-z]{0,8}",
                ],
                0..30,
            )
        ) {
            let text = lines.join("\n");
            for url in parse_feed_list(&text) {
                prop_assert!(!url.is_empty());
                prop_assert!(!url.starts_with('#'));
                prop_assert_eq!(url.trim(), url.as_str());
            }
        }
    }
}
