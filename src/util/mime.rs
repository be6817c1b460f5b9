// MIME type inference from file extension, for enclosure metadata.
// Extensions outside the table fall back to application/octet-stream.

pub fn from_extension(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "aac" => "audio/aac",
        "ogg" | "oga" => "audio/ogg",
        "opus" => "audio/opus",
        "flac" => "audio/flac",
        "wav" => "audio/wav",
        "mp4" | "m4v" => "video/mp4",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_audio_and_video() {
        assert_eq!(from_extension("mp3"), "audio/mpeg");
        assert_eq!(from_extension("m4a"), "audio/mp4");
        assert_eq!(from_extension("webm"), "video/webm");
        assert_eq!(from_extension("MP4"), "video/mp4");
    }

    #[test]
    fn unknown_extension_falls_back() {
        assert_eq!(from_extension("xyz"), "application/octet-stream");
    }
}
