//! Turns feed XML into [`ParsedFeed`].
//!
//! RSS 2.0 goes through the `rss` crate, which understands the iTunes and
//! Dublin Core extensions podcasts rely on. Anything `rss` rejects (Atom,
//! RSS 1.0) is retried with `feed-rs`.

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("not a valid RSS or Atom document: {rss}; {atom}")]
    Unrecognized { rss: String, atom: String },
}

/// Podcast-level metadata plus the items, in document order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedFeed {
    pub title: Option<String>,
    pub description: Option<String>,
    pub link: Option<String>,
    pub language: Option<String>,
    pub copyright: Option<String>,
    /// iTunes author, falling back to the Dublin Core creator.
    pub author: Option<String>,
    pub managing_editor: Option<String>,
    pub owner_email: Option<String>,
    pub image_url: Option<String>,
    pub category: Option<String>,
    pub explicit: Option<bool>,
    pub items: Vec<ParsedItem>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedItem {
    pub title: Option<String>,
    pub description: Option<String>,
    pub link: Option<String>,
    pub guid: Option<String>,
    pub enclosure: Option<ParsedEnclosure>,
    pub published_at: Option<DateTime<Utc>>,
    pub duration: Option<String>,
    pub episode_number: Option<i32>,
    pub episode_type: Option<String>,
    pub image_url: Option<String>,
    pub explicit: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedEnclosure {
    pub url: String,
    pub mime_type: Option<String>,
    pub length: Option<i64>,
}

pub fn parse_feed(text: &str) -> Result<ParsedFeed, ParseError> {
    match rss::Channel::read_from(text.as_bytes()) {
        Ok(channel) => Ok(from_rss(&channel)),
        Err(rss_err) => match feed_rs::parser::parse(text.as_bytes()) {
            Ok(feed) => Ok(from_atom(feed)),
            Err(atom_err) => Err(ParseError::Unrecognized {
                rss: rss_err.to_string(),
                atom: atom_err.to_string(),
            }),
        },
    }
}

fn from_rss(channel: &rss::Channel) -> ParsedFeed {
    let itunes = channel.itunes_ext();

    let author = itunes
        .and_then(|it| non_blank(it.author()))
        .or_else(|| {
            channel
                .dublin_core_ext()
                .and_then(|dc| dc.creators().first())
                .and_then(|c| non_blank(Some(c)))
        });
    let managing_editor = non_blank(channel.managing_editor());
    let owner_email = itunes
        .and_then(|it| it.owner())
        .and_then(|o| non_blank(o.email()))
        .or_else(|| managing_editor.clone());
    // Prefer the iTunes artwork, it is usually the larger one
    let image_url = itunes
        .and_then(|it| non_blank(it.image()))
        .or_else(|| channel.image().and_then(|i| non_blank(Some(i.url()))));
    let category = itunes
        .and_then(|it| it.categories().first())
        .and_then(|c| non_blank(Some(c.text())))
        .or_else(|| {
            channel
                .categories()
                .first()
                .and_then(|c| non_blank(Some(c.name())))
        });

    ParsedFeed {
        title: non_blank(Some(channel.title())),
        description: non_blank(Some(channel.description()))
            .or_else(|| itunes.and_then(|it| non_blank(it.summary()))),
        link: non_blank(Some(channel.link())),
        language: non_blank(channel.language()),
        copyright: non_blank(channel.copyright()),
        author,
        managing_editor,
        owner_email,
        image_url,
        category,
        explicit: itunes.and_then(|it| parse_explicit(it.explicit())),
        items: channel.items().iter().map(item_from_rss).collect(),
    }
}

fn item_from_rss(item: &rss::Item) -> ParsedItem {
    let itunes = item.itunes_ext();

    let enclosure = item.enclosure().and_then(|enc| {
        let url = non_blank(Some(enc.url()))?;
        Some(ParsedEnclosure {
            url,
            mime_type: non_blank(Some(enc.mime_type())),
            length: enc.length().trim().parse().ok(),
        })
    });

    ParsedItem {
        title: non_blank(item.title()),
        description: non_blank(item.description())
            .or_else(|| itunes.and_then(|it| non_blank(it.summary())))
            .or_else(|| non_blank(item.content())),
        link: non_blank(item.link()),
        guid: item.guid().and_then(|g| non_blank(Some(g.value()))),
        enclosure,
        published_at: item.pub_date().and_then(parse_date),
        duration: itunes.and_then(|it| non_blank(it.duration())),
        episode_number: itunes
            .and_then(|it| it.episode())
            .and_then(|n| n.trim().parse().ok()),
        episode_type: itunes.and_then(|it| non_blank(it.episode_type())),
        image_url: itunes.and_then(|it| non_blank(it.image())),
        explicit: itunes.and_then(|it| parse_explicit(it.explicit())),
    }
}

fn from_atom(feed: feed_rs::model::Feed) -> ParsedFeed {
    let author = feed.authors.first();

    ParsedFeed {
        title: feed.title.and_then(|t| non_blank(Some(&t.content))),
        description: feed.description.and_then(|t| non_blank(Some(&t.content))),
        link: feed
            .links
            .iter()
            .find(|l| l.rel.as_deref() != Some("self"))
            .and_then(|l| non_blank(Some(&l.href))),
        language: non_blank(feed.language.as_deref()),
        copyright: feed.rights.and_then(|t| non_blank(Some(&t.content))),
        author: author.and_then(|p| non_blank(Some(&p.name))),
        managing_editor: None,
        owner_email: author.and_then(|p| non_blank(p.email.as_deref())),
        image_url: feed
            .logo
            .or(feed.icon)
            .and_then(|i| non_blank(Some(&i.uri))),
        category: feed
            .categories
            .first()
            .and_then(|c| non_blank(Some(&c.term))),
        explicit: None,
        items: feed.entries.into_iter().map(item_from_atom).collect(),
    }
}

fn item_from_atom(entry: feed_rs::model::Entry) -> ParsedItem {
    let enclosure = entry
        .links
        .iter()
        .find(|l| l.rel.as_deref() == Some("enclosure"))
        .and_then(|l| {
            Some(ParsedEnclosure {
                url: non_blank(Some(&l.href))?,
                mime_type: non_blank(l.media_type.as_deref()),
                length: l.length.and_then(|n| i64::try_from(n).ok()),
            })
        })
        .or_else(|| {
            let content = entry.media.iter().flat_map(|m| m.content.iter()).next()?;
            Some(ParsedEnclosure {
                url: content.url.as_ref()?.to_string(),
                mime_type: content.content_type.as_ref().map(|m| m.to_string()),
                length: content.size.and_then(|n| i64::try_from(n).ok()),
            })
        });

    let link = entry
        .links
        .iter()
        .find(|l| l.rel.as_deref() != Some("enclosure"))
        .and_then(|l| non_blank(Some(&l.href)));
    let duration = entry
        .media
        .iter()
        .find_map(|m| m.duration)
        .map(|d| d.as_secs().to_string());
    let image_url = entry
        .media
        .iter()
        .flat_map(|m| m.thumbnails.iter())
        .next()
        .and_then(|t| non_blank(Some(&t.image.uri)));

    ParsedItem {
        title: entry.title.and_then(|t| non_blank(Some(&t.content))),
        description: entry
            .summary
            .and_then(|t| non_blank(Some(&t.content)))
            .or_else(|| entry.content.and_then(|c| non_blank(c.body.as_deref()))),
        link,
        guid: non_blank(Some(&entry.id)),
        enclosure,
        published_at: entry.published.or(entry.updated),
        duration,
        episode_number: None,
        episode_type: None,
        image_url,
        explicit: None,
    }
}

fn non_blank<S: AsRef<str>>(value: Option<S>) -> Option<String> {
    let value = value?;
    let trimmed = value.as_ref().trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// `yes`/`true`/`explicit` are explicit, `no`/`false`/`clean` are not.
fn parse_explicit(value: Option<&str>) -> Option<bool> {
    let value = value?.trim().to_ascii_lowercase();
    match value.as_str() {
        "" => None,
        "yes" | "true" | "explicit" => Some(true),
        _ => Some(false),
    }
}

fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    let parsed = DateTime::parse_from_rfc2822(value)
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .map(|dt| dt.with_timezone(&Utc));
    match parsed {
        Ok(dt) => Some(dt),
        Err(e) => {
            tracing::debug!(date = %value, error = %e, "Unparseable publish date");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const PODCAST_RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"
     xmlns:itunes="http://www.itunes.com/dtds/podcast-1.0.dtd"
     xmlns:dc="http://purl.org/dc/elements/1.1/">
  <channel>
    <title>Example Show</title>
    <link>https://example.com</link>
    <description>A show about examples</description>
    <language>en-us</language>
    <copyright>2024 Example</copyright>
    <managingEditor>editor@example.com (Editor)</managingEditor>
    <image><url>https://example.com/small.png</url><title>Example Show</title><link>https://example.com</link></image>
    <category>Fallback</category>
    <itunes:author>Jane Host</itunes:author>
    <itunes:owner><itunes:name>Jane</itunes:name><itunes:email>jane@example.com</itunes:email></itunes:owner>
    <itunes:image href="https://example.com/large.png"/>
    <itunes:category text="Technology"/>
    <itunes:explicit>no</itunes:explicit>
    <item>
      <title>Episode 1</title>
      <description>First one</description>
      <link>https://example.com/1</link>
      <guid isPermaLink="false">ep-1</guid>
      <enclosure url="https://cdn.example.com/1.mp3" length="12345" type="audio/mpeg"/>
      <pubDate>Tue, 02 Jan 2024 10:00:00 +0000</pubDate>
      <itunes:duration>00:42:10</itunes:duration>
      <itunes:episode>1</itunes:episode>
      <itunes:episodeType>full</itunes:episodeType>
      <itunes:image href="https://example.com/ep1.png"/>
      <itunes:explicit>yes</itunes:explicit>
    </item>
    <item>
      <title>Trailer</title>
      <pubDate>not a date</pubDate>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn test_parse_podcast_rss_channel() {
        let feed = parse_feed(PODCAST_RSS).unwrap();

        assert_eq!(feed.title.as_deref(), Some("Example Show"));
        assert_eq!(feed.description.as_deref(), Some("A show about examples"));
        assert_eq!(feed.link.as_deref(), Some("https://example.com"));
        assert_eq!(feed.language.as_deref(), Some("en-us"));
        assert_eq!(feed.copyright.as_deref(), Some("2024 Example"));
        assert_eq!(feed.author.as_deref(), Some("Jane Host"));
        assert_eq!(feed.owner_email.as_deref(), Some("jane@example.com"));
        assert_eq!(
            feed.managing_editor.as_deref(),
            Some("editor@example.com (Editor)")
        );
        assert_eq!(
            feed.image_url.as_deref(),
            Some("https://example.com/large.png")
        );
        assert_eq!(feed.category.as_deref(), Some("Technology"));
        assert_eq!(feed.explicit, Some(false));
        assert_eq!(feed.items.len(), 2);
    }

    #[test]
    fn test_parse_podcast_rss_items() {
        let feed = parse_feed(PODCAST_RSS).unwrap();
        let first = &feed.items[0];

        assert_eq!(first.title.as_deref(), Some("Episode 1"));
        assert_eq!(first.guid.as_deref(), Some("ep-1"));
        assert_eq!(
            first.enclosure,
            Some(ParsedEnclosure {
                url: "https://cdn.example.com/1.mp3".into(),
                mime_type: Some("audio/mpeg".into()),
                length: Some(12345),
            })
        );
        assert_eq!(
            first.published_at.map(|d| d.to_rfc3339()),
            Some("2024-01-02T10:00:00+00:00".to_string())
        );
        assert_eq!(first.duration.as_deref(), Some("00:42:10"));
        assert_eq!(first.episode_number, Some(1));
        assert_eq!(first.episode_type.as_deref(), Some("full"));
        assert_eq!(first.image_url.as_deref(), Some("https://example.com/ep1.png"));
        assert_eq!(first.explicit, Some(true));

        // Absent fields stay absent rather than defaulting
        let trailer = &feed.items[1];
        assert_eq!(trailer.guid, None);
        assert_eq!(trailer.enclosure, None);
        assert_eq!(trailer.published_at, None);
        assert_eq!(trailer.explicit, None);
    }

    #[test]
    fn test_dublin_core_creator_fallback() {
        let rss = r#"<?xml version="1.0"?>
<rss version="2.0" xmlns:dc="http://purl.org/dc/elements/1.1/"><channel>
  <title>T</title><link>https://t.example</link><description>d</description>
  <dc:creator>DC Author</dc:creator>
</channel></rss>"#;

        let feed = parse_feed(rss).unwrap();
        assert_eq!(feed.author.as_deref(), Some("DC Author"));
        assert_eq!(feed.owner_email, None);
    }

    #[test]
    fn test_parse_atom_feed() {
        let atom = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom Cast</title>
  <id>urn:uuid:60a76c80-d399-11d9-b93C-0003939e0af6</id>
  <updated>2024-01-01T00:00:00Z</updated>
  <link href="https://atom.example/"/>
  <author><name>Ann</name><email>ann@atom.example</email></author>
  <entry>
    <title>Atom Episode</title>
    <id>urn:uuid:1225c695-cfb8-4ebb-aaaa-80da344efa6a</id>
    <updated>2024-01-02T00:00:00Z</updated>
    <link href="https://atom.example/ep"/>
    <link rel="enclosure" type="audio/ogg" length="99" href="https://atom.example/ep.ogg"/>
    <summary>An entry</summary>
  </entry>
</feed>"#;

        let feed = parse_feed(atom).unwrap();
        assert_eq!(feed.title.as_deref(), Some("Atom Cast"));
        assert_eq!(feed.author.as_deref(), Some("Ann"));
        assert_eq!(feed.owner_email.as_deref(), Some("ann@atom.example"));
        assert_eq!(feed.items.len(), 1);

        let entry = &feed.items[0];
        assert_eq!(entry.title.as_deref(), Some("Atom Episode"));
        assert_eq!(
            entry.guid.as_deref(),
            Some("urn:uuid:1225c695-cfb8-4ebb-aaaa-80da344efa6a")
        );
        assert_eq!(entry.link.as_deref(), Some("https://atom.example/ep"));
        let enclosure = entry.enclosure.as_ref().unwrap();
        assert_eq!(enclosure.url, "https://atom.example/ep.ogg");
        assert_eq!(enclosure.mime_type.as_deref(), Some("audio/ogg"));
        assert_eq!(enclosure.length, Some(99));
        assert!(entry.published_at.is_some());
    }

    #[test]
    fn test_garbage_is_parse_error() {
        assert!(parse_feed("<rss><channel><title>unclosed").is_err());
    }

    #[test]
    fn test_parse_explicit_values() {
        assert_eq!(parse_explicit(Some("Yes")), Some(true));
        assert_eq!(parse_explicit(Some("explicit")), Some(true));
        assert_eq!(parse_explicit(Some("clean")), Some(false));
        assert_eq!(parse_explicit(Some("  ")), None);
        assert_eq!(parse_explicit(None), None);
    }

    #[test]
    fn test_parse_date_formats() {
        assert!(parse_date("Tue, 02 Jan 2024 10:00:00 GMT").is_some());
        assert!(parse_date("2024-01-02T10:00:00Z").is_some());
        assert!(parse_date("yesterday").is_none());
    }
}
