use uuid::Uuid;

/// Extensions accepted straight from an enclosure URL.
pub const AUDIO_EXTENSIONS: [&str; 5] = ["mp3", "m4a", "wav", "flac", "ogg"];

const DEFAULT_EXTENSION: &str = "mp3";
const DEFAULT_CONTENT_TYPE: &str = "audio/mpeg";

/// File extension for an enclosure.
///
/// The URL's last path segment wins when it ends in a known audio extension;
/// otherwise the MIME type decides, and `mp3` is the fallback.
pub fn extension_for(url: &str, mime_type: Option<&str>) -> &'static str {
    extension_from_url(url)
        .or_else(|| mime_type.and_then(extension_from_mime))
        .unwrap_or(DEFAULT_EXTENSION)
}

fn extension_from_url(raw: &str) -> Option<&'static str> {
    let path = match url::Url::parse(raw) {
        Ok(parsed) => parsed.path().to_string(),
        // Not absolute; drop any query or fragment by hand
        Err(_) => raw.split(['?', '#']).next().unwrap_or_default().to_string(),
    };

    let segment = path.rsplit('/').next()?;
    let (_, ext) = segment.rsplit_once('.')?;
    AUDIO_EXTENSIONS
        .iter()
        .find(|known| known.eq_ignore_ascii_case(ext))
        .copied()
}

fn extension_from_mime(mime: &str) -> Option<&'static str> {
    // Ignore parameters such as "; charset=binary"
    let essence = mime.split(';').next().unwrap_or_default().trim();
    let ext = match essence.to_ascii_lowercase().as_str() {
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/mp4" | "audio/x-m4a" | "audio/m4a" => "m4a",
        "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
        "audio/flac" | "audio/x-flac" => "flac",
        "audio/ogg" => "ogg",
        _ => return None,
    };
    Some(ext)
}

/// Content type sent with the uploaded object.
pub fn content_type_for(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "wav" => "audio/wav",
        "flac" => "audio/flac",
        "ogg" => "audio/ogg",
        _ => DEFAULT_CONTENT_TYPE,
    }
}

/// Object key (and staged file name) for an episode's media.
pub fn object_key(episode_id: Uuid, extension: &str) -> String {
    format!("{}.{}", episode_id, extension)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_extension_wins() {
        assert_eq!(
            extension_for("https://cdn.example.com/ep/42.M4A?token=abc", Some("audio/mpeg")),
            "m4a"
        );
        assert_eq!(extension_for("https://cdn.example.com/a.ogg#t=10", None), "ogg");
    }

    #[test]
    fn test_mime_used_for_extensionless_url() {
        assert_eq!(
            extension_for("https://cdn.example.com/episodes/42", Some("audio/flac")),
            "flac"
        );
        assert_eq!(
            extension_for("https://cdn.example.com/play", Some("audio/x-m4a")),
            "m4a"
        );
        assert_eq!(
            extension_for("https://cdn.example.com/play", Some("audio/wave; codecs=1")),
            "wav"
        );
    }

    #[test]
    fn test_unknown_url_extension_falls_through_to_mime() {
        assert_eq!(
            extension_for("https://cdn.example.com/stream.php", Some("audio/ogg")),
            "ogg"
        );
    }

    #[test]
    fn test_default_is_mp3() {
        assert_eq!(extension_for("https://cdn.example.com/play", None), "mp3");
        assert_eq!(
            extension_for("https://cdn.example.com/play", Some("video/mp4")),
            "mp3"
        );
    }

    #[test]
    fn test_extension_only_from_last_segment() {
        assert_eq!(
            extension_for("https://cdn.example.com/show.flac/download", Some("audio/ogg")),
            "ogg"
        );
    }

    #[test]
    fn test_content_type_table() {
        assert_eq!(content_type_for("mp3"), "audio/mpeg");
        assert_eq!(content_type_for("m4a"), "audio/mp4");
        assert_eq!(content_type_for("wav"), "audio/wav");
        assert_eq!(content_type_for("flac"), "audio/flac");
        assert_eq!(content_type_for("ogg"), "audio/ogg");
        assert_eq!(content_type_for("aac"), "audio/mpeg");
    }

    #[test]
    fn test_object_key() {
        let id = Uuid::from_u128(7);
        assert_eq!(
            object_key(id, "flac"),
            "00000000-0000-0000-0000-000000000007.flac"
        );
    }
}
