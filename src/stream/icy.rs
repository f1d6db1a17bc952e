//! ICY protocol support
//!
//! SHOUTcast servers answer with `ICY 200 OK` (or a plain HTTP status) and,
//! when the client sent `Icy-MetaData: 1`, interleave a metadata block after
//! every `icy-metaint` audio bytes: one length byte `L` followed by `16 * L`
//! bytes of text such as `StreamTitle='Artist - Song';`.

use bytes::Bytes;

use crate::error::StreamError;

/// Headers parsed from an ICY stream response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IcyHeaders {
    /// Audio bytes between metadata blocks, 0 when metadata is off
    pub metaint: usize,
    pub station_name: Option<String>,
    pub genre: Option<String>,
    pub content_type: Option<String>,
    pub bitrate: Option<u32>,
}

impl IcyHeaders {
    /// Parse a response head (status line plus header lines)
    pub fn parse_response(head: &str) -> Result<Self, StreamError> {
        let mut lines = head.lines();
        let status = lines
            .next()
            .ok_or_else(|| StreamError::BadResponse("empty response".to_string()))?;
        check_status_line(status)?;

        let mut headers = IcyHeaders::default();
        for line in lines {
            if line.is_empty() {
                break;
            }
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            match name.trim().to_ascii_lowercase().as_str() {
                "icy-metaint" => headers.metaint = value.parse().unwrap_or(0),
                "icy-name" => headers.station_name = Some(value.to_string()),
                "icy-genre" => headers.genre = Some(value.to_string()),
                "icy-br" => headers.bitrate = value.parse().ok(),
                "content-type" => headers.content_type = Some(value.to_string()),
                _ => {}
            }
        }

        Ok(headers)
    }
}

/// Accept `ICY 200 ...` and `HTTP/1.x 200 ...`
pub fn check_status_line(line: &str) -> Result<(), StreamError> {
    let mut parts = line.split_whitespace();
    let protocol = parts.next().unwrap_or_default();
    let code = parts.next().unwrap_or_default();

    if protocol != "ICY" && !protocol.starts_with("HTTP/") {
        return Err(StreamError::BadResponse(format!("not an ICY/HTTP response: {}", line)));
    }
    if code != "200" {
        return Err(StreamError::BadResponse(line.trim().to_string()));
    }
    Ok(())
}

/// Pull the `StreamTitle` value out of a metadata block
pub fn extract_stream_title(metadata: &[u8]) -> Option<String> {
    let end = metadata.iter().position(|&b| b == 0).unwrap_or(metadata.len());
    let text = String::from_utf8_lossy(&metadata[..end]);

    const KEY: &str = "StreamTitle='";
    let start = text.find(KEY)? + KEY.len();
    let rest = &text[start..];
    // Titles may contain apostrophes; the field ends at `';`
    let stop = rest.find("';").or_else(|| rest.rfind('\''))?;

    let title = rest[..stop].trim();
    if title.is_empty() {
        None
    } else {
        Some(title.to_string())
    }
}

/// Output of the demuxer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IcyChunk {
    Audio(Bytes),
    Title(String),
}

#[derive(Debug, Clone, Copy)]
enum DemuxState {
    Audio { remaining: usize },
    Length,
    Metadata { remaining: usize },
}

/// Separates audio bytes from interleaved metadata blocks
pub struct IcyDemuxer {
    metaint: usize,
    state: DemuxState,
    metadata: Vec<u8>,
    last_title: Option<String>,
}

impl IcyDemuxer {
    pub fn new(metaint: usize) -> Self {
        Self {
            metaint,
            state: DemuxState::Audio { remaining: metaint },
            metadata: Vec::new(),
            last_title: None,
        }
    }

    /// Feed received bytes. Titles are reported only when they change.
    pub fn push(&mut self, input: &[u8]) -> Vec<IcyChunk> {
        if self.metaint == 0 {
            if input.is_empty() {
                return Vec::new();
            }
            return vec![IcyChunk::Audio(Bytes::copy_from_slice(input))];
        }

        let mut out = Vec::new();
        let mut pos = 0;
        while pos < input.len() {
            match self.state {
                DemuxState::Audio { remaining } => {
                    let n = remaining.min(input.len() - pos);
                    out.push(IcyChunk::Audio(Bytes::copy_from_slice(&input[pos..pos + n])));
                    pos += n;
                    self.state = if n == remaining {
                        DemuxState::Length
                    } else {
                        DemuxState::Audio {
                            remaining: remaining - n,
                        }
                    };
                }
                DemuxState::Length => {
                    let len = input[pos] as usize * 16;
                    pos += 1;
                    self.metadata.clear();
                    self.state = if len == 0 {
                        DemuxState::Audio {
                            remaining: self.metaint,
                        }
                    } else {
                        DemuxState::Metadata { remaining: len }
                    };
                }
                DemuxState::Metadata { remaining } => {
                    let n = remaining.min(input.len() - pos);
                    self.metadata.extend_from_slice(&input[pos..pos + n]);
                    pos += n;
                    if n < remaining {
                        self.state = DemuxState::Metadata {
                            remaining: remaining - n,
                        };
                        continue;
                    }

                    self.state = DemuxState::Audio {
                        remaining: self.metaint,
                    };
                    if let Some(title) = extract_stream_title(&self.metadata) {
                        if self.last_title.as_deref() != Some(title.as_str()) {
                            tracing::debug!("ICY title: {}", title);
                            self.last_title = Some(title.clone());
                            out.push(IcyChunk::Title(title));
                        }
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata_block(text: &str) -> Vec<u8> {
        let blocks = (text.len() + 15) / 16;
        let mut out = vec![blocks as u8];
        out.extend_from_slice(text.as_bytes());
        out.resize(1 + blocks * 16, 0);
        out
    }

    fn audio(chunks: &[IcyChunk]) -> Vec<u8> {
        chunks
            .iter()
            .filter_map(|c| match c {
                IcyChunk::Audio(b) => Some(b.to_vec()),
                IcyChunk::Title(_) => None,
            })
            .flatten()
            .collect()
    }

    fn titles(chunks: &[IcyChunk]) -> Vec<String> {
        chunks
            .iter()
            .filter_map(|c| match c {
                IcyChunk::Title(t) => Some(t.clone()),
                IcyChunk::Audio(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_parse_icy_response() {
        let head = "ICY 200 OK\r\nicy-name: Test FM\r\nicy-genre:Jazz\r\nIcy-MetaInt: 16000\r\n\
                    icy-br: 128\r\ncontent-type: audio/aac\r\n\r\n";
        let headers = IcyHeaders::parse_response(head).unwrap();

        assert_eq!(headers.metaint, 16000);
        assert_eq!(headers.station_name.as_deref(), Some("Test FM"));
        assert_eq!(headers.genre.as_deref(), Some("Jazz"));
        assert_eq!(headers.bitrate, Some(128));
        assert_eq!(headers.content_type.as_deref(), Some("audio/aac"));
    }

    #[test]
    fn test_http_status_accepted_and_errors_rejected() {
        assert!(check_status_line("HTTP/1.0 200 OK").is_ok());
        assert!(check_status_line("HTTP/1.1 404 Not Found").is_err());
        assert!(check_status_line("ICY 401 Service Unavailable").is_err());
        assert!(check_status_line("SSH-2.0-OpenSSH").is_err());
    }

    #[test]
    fn test_extract_stream_title() {
        let meta = b"StreamTitle='Artist - Song';StreamUrl='';\0\0\0";
        assert_eq!(extract_stream_title(meta).as_deref(), Some("Artist - Song"));

        let meta = b"StreamTitle='Guns N' Roses - Patience';";
        assert_eq!(
            extract_stream_title(meta).as_deref(),
            Some("Guns N' Roses - Patience")
        );

        assert_eq!(extract_stream_title(b"StreamTitle='';"), None);
        assert_eq!(extract_stream_title(b"StreamUrl='x';"), None);
    }

    #[test]
    fn test_demux_strips_metadata() {
        let mut demuxer = IcyDemuxer::new(4);
        let mut input = vec![1, 2, 3, 4];
        input.extend(metadata_block("StreamTitle='One';"));
        input.extend([5, 6, 7, 8]);
        input.push(0);
        input.extend([9, 10]);

        let chunks = demuxer.push(&input);

        assert_eq!(audio(&chunks), vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
        assert_eq!(titles(&chunks), vec!["One".to_string()]);
    }

    #[test]
    fn test_demux_across_arbitrary_splits() {
        let mut input = vec![1, 2, 3];
        input.extend(metadata_block("StreamTitle='A';"));
        input.extend([4, 5, 6]);
        input.extend(metadata_block("StreamTitle='B';"));
        input.extend([7]);

        for split in 1..input.len() {
            let mut demuxer = IcyDemuxer::new(3);
            let mut chunks = demuxer.push(&input[..split]);
            chunks.extend(demuxer.push(&input[split..]));

            assert_eq!(audio(&chunks), vec![1, 2, 3, 4, 5, 6, 7], "split at {}", split);
            assert_eq!(titles(&chunks), vec!["A".to_string(), "B".to_string()]);
        }
    }

    #[test]
    fn test_repeated_title_reported_once() {
        let mut demuxer = IcyDemuxer::new(1);
        let mut input = Vec::new();
        for _ in 0..3 {
            input.push(0xaa);
            input.extend(metadata_block("StreamTitle='Same';"));
        }

        let chunks = demuxer.push(&input);
        assert_eq!(titles(&chunks), vec!["Same".to_string()]);
    }

    #[test]
    fn test_no_metaint_passes_everything_through() {
        let mut demuxer = IcyDemuxer::new(0);
        let chunks = demuxer.push(&[1, 0, 2]);
        assert_eq!(chunks, vec![IcyChunk::Audio(Bytes::from_static(&[1, 0, 2]))]);
    }
}
