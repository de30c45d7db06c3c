//! Module argument strings and device property lists.
//!
//! The sound server parses module arguments as space-separated `key=value`
//! pairs where a value may be wrapped in double quotes or ticks, with a
//! backslash escaping the next character.

/// Sample rate of every pipe device, in Hz.
pub const SAMPLE_RATE: u32 = 48_000;
/// Bytes per sample (`float32be`).
pub const BYTES_PER_SAMPLE: u32 = 4;
/// Channel count of every pipe device.
pub const CHANNELS: u32 = 1;
/// Sample format name understood by the server.
pub const SAMPLE_FORMAT: &str = "float32be";

/// Buffer size in bytes for the requested latency.
///
/// `floor(SAMPLE_RATE * BYTES_PER_SAMPLE * CHANNELS * latency_ms / 1000)`.
/// Negative or NaN latencies yield 0; callers validate before calling.
#[must_use]
pub fn buffer_size_bytes(latency_ms: f64) -> u64 {
    let bytes_per_second = f64::from(SAMPLE_RATE * BYTES_PER_SAMPLE * CHANNELS);
    (bytes_per_second * latency_ms / 1000.0) as u64
}

/// Wrap a value in double quotes, escaping `\` and `"`.
#[must_use]
pub fn quote(value: &str) -> String {
    quote_with(value, '"')
}

/// Inverse of [`quote`]. Returns `None` for malformed input.
#[must_use]
pub fn unquote(quoted: &str) -> Option<String> {
    let inner = quoted.strip_prefix('"')?.strip_suffix('"')?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push(chars.next()?),
            '"' => return None,
            c => out.push(c),
        }
    }
    Some(out)
}

/// Build a module argument string: `a="v1" b="v2"`.
#[must_use]
pub fn prop_list(pairs: &[(&str, &str)]) -> String {
    pairs
        .iter()
        .map(|(key, value)| format!("{key}={}", quote(value)))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split a module argument string back into key/value pairs.
///
/// Accepts bare, double-quoted and tick-quoted values. Returns `None` if a
/// quote is left open, an escape dangles, or a token has no `=`.
#[must_use]
pub fn parse_prop_list(args: &str) -> Option<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    let mut chars = args.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        if chars.peek().is_none() {
            return Some(pairs);
        }

        let mut key = String::new();
        loop {
            match chars.next()? {
                '=' => break,
                c if c.is_whitespace() => return None,
                c => key.push(c),
            }
        }

        let mut value = String::new();
        match chars.peek() {
            Some(&q @ ('"' | '\'')) => {
                chars.next();
                loop {
                    match chars.next()? {
                        '\\' => value.push(chars.next()?),
                        c if c == q => break,
                        c => value.push(c),
                    }
                }
            }
            _ => {
                while let Some(c) = chars.next_if(|c| !c.is_whitespace()) {
                    value.push(c);
                }
            }
        }

        pairs.push((key, value));
    }
}

fn quote_with(value: &str, quote: char) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push(quote);
    for c in value.chars() {
        if c == '\\' || c == quote {
            out.push('\\');
        }
        out.push(c);
    }
    out.push(quote);
    out
}

/// Device metadata attached through `source_properties` / `sink_properties`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceProperties {
    /// `device.buffering.buffer_size` in bytes (sources only)
    pub buffer_size: Option<u64>,
    /// `device.icon_name`
    pub icon_name: String,
    /// `device.description`
    pub description: String,
}

impl DeviceProperties {
    /// Render the nested property list.
    ///
    /// String values are tick-quoted so they survive the outer double-quote
    /// layer applied by [`prop_list`].
    #[must_use]
    pub fn render(&self) -> String {
        let mut parts = Vec::with_capacity(3);
        if let Some(size) = self.buffer_size {
            parts.push(format!("device.buffering.buffer_size={size}"));
        }
        parts.push(format!("device.icon_name={}", quote_with(&self.icon_name, '\'')));
        parts.push(format!("device.description={}", quote_with(&self.description, '\'')));
        parts.join(" ")
    }
}
