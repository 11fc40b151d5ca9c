//! One GET attempt with libcurl, body written to a local file.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::str;

use super::FetchOptions;
use crate::control::CancelToken;
use crate::retry::AttemptError;

/// Downloads `url` into `dest` (truncating it). Returns the number of body bytes.
///
/// Redirects are followed (at most 10). The announced `Content-Length` of the
/// final response must match what arrived.
pub(super) fn download_to(
    url: &str,
    dest: &Path,
    opts: &FetchOptions,
    cancel: &CancelToken,
) -> Result<u64, AttemptError> {
    let mut file = File::create(dest).map_err(AttemptError::Storage)?;

    let mut easy = curl::easy::Easy::new();
    easy.url(url).map_err(AttemptError::Curl)?;
    easy.follow_location(true).map_err(AttemptError::Curl)?;
    easy.max_redirections(10).map_err(AttemptError::Curl)?;
    easy.connect_timeout(opts.connect_timeout)
        .map_err(AttemptError::Curl)?;
    easy.timeout(opts.timeout).map_err(AttemptError::Curl)?;
    easy.low_speed_limit(opts.low_speed_limit)
        .map_err(AttemptError::Curl)?;
    easy.low_speed_time(opts.low_speed_time)
        .map_err(AttemptError::Curl)?;
    easy.progress(true).map_err(AttemptError::Curl)?;

    let mut received: u64 = 0;
    let mut content_length: Option<u64> = None;
    let mut write_error: Option<io::Error> = None;

    let performed = {
        let mut transfer = easy.transfer();
        transfer
            .header_function(|line| {
                if let Ok(line) = str::from_utf8(line) {
                    // A new status line starts a new response (redirect hop).
                    if line.starts_with("HTTP/") {
                        content_length = None;
                    } else {
                        content_length = parse_content_length(line).or(content_length);
                    }
                }
                true
            })
            .map_err(AttemptError::Curl)?;
        transfer
            .write_function(|data| match file.write_all(data) {
                Ok(()) => {
                    received += data.len() as u64;
                    Ok(data.len())
                }
                Err(e) => {
                    write_error = Some(e);
                    Ok(0) // abort transfer
                }
            })
            .map_err(AttemptError::Curl)?;
        transfer
            .progress_function(|_, _, _, _| !cancel.is_cancelled())
            .map_err(AttemptError::Curl)?;
        transfer.perform()
    };

    if cancel.is_cancelled() {
        return Err(AttemptError::Cancelled);
    }
    if let Some(e) = write_error {
        return Err(AttemptError::Storage(e));
    }
    performed.map_err(AttemptError::Curl)?;

    // Zero for non-HTTP schemes (file://).
    let code = easy.response_code().map_err(AttemptError::Curl)?;
    if code != 0 && !(200..300).contains(&code) {
        return Err(AttemptError::Http(code));
    }
    if let Some(expected) = content_length {
        if expected != received {
            return Err(AttemptError::PartialTransfer { expected, received });
        }
    }
    file.sync_all().map_err(AttemptError::Storage)?;
    Ok(received)
}

fn parse_content_length(line: &str) -> Option<u64> {
    let (name, value) = line.split_once(':')?;
    if !name.trim().eq_ignore_ascii_case("content-length") {
        return None;
    }
    value.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_length_header_parsing() {
        assert_eq!(parse_content_length("Content-Length: 1234\r\n"), Some(1234));
        assert_eq!(parse_content_length("content-length:7"), Some(7));
        assert_eq!(parse_content_length("Content-Type: application/zip\r\n"), None);
        assert_eq!(parse_content_length("Content-Length: lots\r\n"), None);
        assert_eq!(parse_content_length("HTTP/1.1 200 OK\r\n"), None);
    }
}
