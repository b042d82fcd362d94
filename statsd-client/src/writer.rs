use std::borrow::Cow;

const RESERVED_CHARS: [char; 5] = [':', '|', '@', '\n', '\r'];
const SCOPE_SEPARATOR: &str = "::";

/// Kind of metric carried by a single line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetricType {
    /// A delta added to a counter on the server.
    Counter,

    /// An absolute value snapshot.
    Gauge,

    /// An elapsed time, in milliseconds.
    Timing,
}

impl MetricType {
    fn as_str(self) -> &'static str {
        match self {
            MetricType::Counter => "c",
            MetricType::Gauge => "g",
            MetricType::Timing => "ms",
        }
    }
}

/// A numeric metric value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MetricValue {
    /// A signed integer value.
    Integer(i64),

    /// An unsigned integer value.
    Unsigned(u64),

    /// A floating-point value.
    FloatingPoint(f64),
}

macro_rules! impl_from_for_value {
    ($variant:ident, $target:ty, $($ty:ty),+) => {
        $(
            impl From<$ty> for MetricValue {
                fn from(value: $ty) -> Self {
                    MetricValue::$variant(<$target>::from(value))
                }
            }
        )+
    };
}

impl_from_for_value!(Integer, i64, i8, i16, i32, i64);
impl_from_for_value!(Unsigned, u64, u8, u16, u32, u64);
impl_from_for_value!(FloatingPoint, f64, f32, f64);

impl MetricValue {
    /// Returns `false` for NaN and infinite floating-point values.
    pub(crate) fn is_finite(self) -> bool {
        match self {
            MetricValue::FloatingPoint(v) => v.is_finite(),
            MetricValue::Integer(_) | MetricValue::Unsigned(_) => true,
        }
    }
}

struct MetricValueFormatter {
    int_writer: itoa::Buffer,
    float_writer: ryu::Buffer,
}

impl MetricValueFormatter {
    fn new() -> Self {
        Self { int_writer: itoa::Buffer::new(), float_writer: ryu::Buffer::new() }
    }

    fn format(&mut self, value: MetricValue) -> &str {
        match value {
            MetricValue::Integer(v) => self.int_writer.format(v),
            MetricValue::Unsigned(v) => self.int_writer.format(v),
            MetricValue::FloatingPoint(v) => self.float_writer.format(v),
        }
    }
}

/// Makes a stat name safe to embed in a line.
///
/// Nested scope separators (`::`) become `.`, and the protocol delimiters `:`, `|` and `@` become `_`, as do line
/// breaks, which would otherwise split one line into two within a batch. Names that need no changes are borrowed
/// as-is.
pub fn sanitize_name(name: &str) -> Cow<'_, str> {
    if !name.contains(RESERVED_CHARS) {
        return Cow::Borrowed(name);
    }

    let sanitized = name.replace(SCOPE_SEPARATOR, ".").replace(RESERVED_CHARS, "_");
    Cow::Owned(sanitized)
}

/// Encodes a single line in the format `<prefix><name>:<value>|<type>[|@<rate>]`.
///
/// `prefix` is written verbatim, so a namespace must already carry its trailing `.`. The sample rate suffix is only
/// written for rates below 1.
pub fn write_line(
    prefix: &str,
    name: &str,
    value: MetricValue,
    metric_type: MetricType,
    sample_rate: f64,
) -> String {
    let name = sanitize_name(name);
    let mut formatter = MetricValueFormatter::new();

    let mut line = String::with_capacity(prefix.len() + name.len() + 24);
    line.push_str(prefix);
    line.push_str(&name);
    line.push(':');
    line.push_str(formatter.format(value));
    line.push('|');
    line.push_str(metric_type.as_str());

    if sample_rate < 1.0 {
        line.push_str("|@");
        line.push_str(formatter.format(MetricValue::FloatingPoint(sample_rate)));
    }

    line
}

/// Lines waiting to be sent, in the order they were written.
#[derive(Debug, Default)]
pub(crate) struct PendingBatch {
    lines: Vec<String>,
}

impl PendingBatch {
    pub fn push(&mut self, line: String) {
        self.lines.push(line);
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Takes every pending line, joined by newlines, leaving the batch empty.
    ///
    /// Returns `None` if there was nothing pending.
    pub fn take_payload(&mut self) -> Option<Vec<u8>> {
        if self.is_empty() {
            return None;
        }

        let payload = self.lines.join("\n");
        self.lines.clear();
        Some(payload.into_bytes())
    }
}
