/// Recovery of the detection JSON object from free-form model replies
use super::{merge_index_intervals, IndexInterval, RawDetection};
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Outcome of sanitizing one reply, with the facts needed for shape checks
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SanitizeReport {
    /// Cleaned detection
    pub detection: RawDetection,
    /// Whether any parse strategy produced a JSON object
    pub parsed: bool,
    /// `exist` as claimed by the model before the interval post-condition
    pub claimed_exist: bool,
    /// Number of `index_lists` candidates the model supplied
    pub candidate_count: usize,
    /// Candidates dropped for not being a numeric pair
    pub rejected_count: usize,
    /// `index_lists` was present but not an array
    pub index_lists_not_array: bool,
}

impl SanitizeReport {
    /// Describe a contract violation in the reply, if there is one.
    ///
    /// A reply that claims an ad but whose `index_lists` is not an array, or whose
    /// candidates were all rejected, is reported; plain "no ad" replies never are.
    pub fn shape_violation(&self) -> Option<String> {
        if !self.parsed || !self.claimed_exist {
            return None;
        }

        if self.index_lists_not_array {
            return Some("index_lists is not an array".to_string());
        }

        if self.candidate_count > 0 && self.rejected_count == self.candidate_count {
            return Some(format!(
                "none of the {} index_lists entries is a [number, number] pair",
                self.candidate_count
            ));
        }

        None
    }
}

/// Parses untrusted model text into a [`RawDetection`]
pub struct ResultSanitizer;

impl ResultSanitizer {
    /// Parse a reply; never fails, returns the empty detection on malformed input.
    ///
    /// `caption_count` bounds the indices when positive.
    pub fn parse(raw: &str, caption_count: usize) -> RawDetection {
        Self::inspect(raw, caption_count).detection
    }

    /// Parse a reply and keep the bookkeeping used for structural validation
    pub fn inspect(raw: &str, caption_count: usize) -> SanitizeReport {
        let Some(object) = Self::extract_object(raw) else {
            debug!("No JSON object recovered from model reply ({} chars)", raw.len());
            return SanitizeReport::default();
        };

        let mut report = SanitizeReport {
            parsed: true,
            ..SanitizeReport::default()
        };

        let exist = object.get("exist").and_then(Value::as_bool).unwrap_or(false);
        report.claimed_exist = exist;

        let good_name = match object.get("good_name") {
            Some(Value::Array(names)) => names
                .iter()
                .filter_map(|name| name.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        };

        let candidates: &[Value] = match object.get("index_lists") {
            Some(Value::Array(items)) => items,
            Some(_) => {
                report.index_lists_not_array = true;
                &[]
            }
            None => &[],
        };
        report.candidate_count = candidates.len();

        let mut cleaned = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            match Self::clean_interval(candidate, caption_count) {
                Some(interval) => cleaned.push(interval),
                None => report.rejected_count += 1,
            }
        }

        let index_lists = merge_index_intervals(&cleaned);

        // Only trust the verdict when at least one interval backs it
        let exist = exist && !index_lists.is_empty();

        report.detection = RawDetection {
            exist,
            good_name,
            index_lists,
        };
        report
    }

    /// Floor, clamp and order a single `[a, b]` candidate
    fn clean_interval(candidate: &Value, caption_count: usize) -> Option<IndexInterval> {
        let pair = candidate.as_array()?;
        if pair.len() != 2 {
            return None;
        }

        let mut a = Self::to_index(pair[0].as_f64()?);
        let mut b = Self::to_index(pair[1].as_f64()?);

        if caption_count > 0 {
            let last = (caption_count - 1) as i64;
            a = a.min(last);
            b = b.min(last);
        }

        if a > b {
            std::mem::swap(&mut a, &mut b);
        }

        Some((a, b))
    }

    fn to_index(value: f64) -> i64 {
        (value.floor() as i64).max(0)
    }

    /// Try every recovery strategy in turn and return the first JSON object
    fn extract_object(raw: &str) -> Option<Map<String, Value>> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }

        let primary = normalize_quotes(outermost_block(&strip_fences(trimmed)));
        if let Some(object) = parse_object(&primary) {
            return Some(object);
        }

        debug!("Primary parse failed, retrying on the raw reply");
        let fallback = raw_block(raw).map(normalize_quotes);
        if let Some(object) = fallback.as_deref().and_then(parse_object) {
            return Some(object);
        }

        let uncommented = normalize_quotes(outermost_block(&strip_comments(&strip_fences(trimmed))));
        if let Some(object) = parse_object(&uncommented) {
            return Some(object);
        }

        warn!("Model reply could not be parsed as a detection object");
        None
    }
}

/// Remove ``` delimiters while keeping the fenced text
fn strip_fences(text: &str) -> String {
    if let Ok(re) = Regex::new(r"```[\s\S]*?```") {
        re.replace_all(text, |caps: &regex::Captures| caps[0].replace("```", ""))
            .into_owned()
    } else {
        text.to_string()
    }
}

/// Greedy `{ ... }` span: first `{` through last `}`, or the text unchanged
fn outermost_block(text: &str) -> &str {
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text,
    }
}

/// Greedy `{ ... }` span of the untouched reply, if any
fn raw_block(raw: &str) -> Option<&str> {
    match (raw.find('{'), raw.rfind('}')) {
        (Some(start), Some(end)) if start < end => Some(&raw[start..=end]),
        _ => None,
    }
}

/// Replace typographic quotation marks with their ASCII forms
fn normalize_quotes(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' | '\u{2033}' => '"',
            '\u{2018}' | '\u{2019}' | '\u{2032}' => '\'',
            other => other,
        })
        .collect()
}

/// Drop `/* ... */` blocks and `//` line comments that are not part of a URL
fn strip_comments(text: &str) -> String {
    let mut result = text.to_string();

    if let Ok(re) = Regex::new(r"/\*[\s\S]*?\*/") {
        result = re.replace_all(&result, "").into_owned();
    }

    if let Ok(re) = Regex::new(r"(?m)(^|[^:])//[^\n]*$") {
        result = re.replace_all(&result, "$1").into_owned();
    }

    result
}

fn parse_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(object)) => Some(object),
        _ => None,
    }
}
