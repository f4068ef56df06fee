/// Video identifier extraction from page URLs
use anyhow::{anyhow, Result};
use regex::Regex;
use url::Url;

const XOR_CODE: u64 = 23_442_827_791_579;
const MAX_AID: u64 = 1 << 51;
const BASE: u64 = 58;
const ALPHABET: &[u8] = b"FcwAPNKTMug3GV5Lj7EJnHpWsx4tb8haYeviqBz6rkCy12mUSDQX9RdoZf";

/// Extract the BV identifier from a video page URL.
///
/// Tries a `BV...` path segment, then an `av<digits>` id, then the `bvid`
/// query parameter.
pub fn extract_video_id(page_url: &str) -> Result<String> {
    if let Ok(re) = Regex::new(r"BV\w+") {
        if let Some(m) = re.find(page_url) {
            return Ok(m.as_str().to_string());
        }
    }

    if let Ok(re) = Regex::new(r"av(\d+)") {
        if let Some(captures) = re.captures(page_url) {
            let aid: u64 = captures[1].parse()?;
            return Ok(av_to_bv(aid));
        }
    }

    let parsed = Url::parse(page_url).map_err(|e| anyhow!("Failed to parse URL {}: {}", page_url, e))?;
    if let Some((_, bvid)) = parsed.query_pairs().find(|(key, _)| key == "bvid") {
        if !bvid.is_empty() {
            return Ok(bvid.into_owned());
        }
    }

    Err(anyhow!("No video id found in {}", page_url))
}

/// Convert a legacy numeric `av` id to its `BV` form
pub fn av_to_bv(aid: u64) -> String {
    let mut bytes = *b"BV1000000000";
    let mut tmp = (MAX_AID | aid) ^ XOR_CODE;
    let mut index = bytes.len() - 1;

    while tmp > 0 && index > 2 {
        bytes[index] = ALPHABET[(tmp % BASE) as usize];
        tmp /= BASE;
        index -= 1;
    }

    bytes.swap(3, 9);
    bytes.swap(4, 7);
    String::from_utf8_lossy(&bytes).into_owned()
}
