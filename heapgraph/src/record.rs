use std::{
    fmt,
    io::{self, BufRead},
};

use super::error::ParseReason;

pub const COMMENT: char = '#';

const ARROW: &str = "->";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationRecord {
    pub base: u64,
    pub size: u64,
}

impl AllocationRecord {
    /// Last address claimed by this allocation. The bound is inclusive, so
    /// the byte one past the end still belongs to it.
    #[inline]
    pub fn end(&self) -> u64 {
        self.base.saturating_add(self.size)
    }

    #[inline]
    pub fn contains(&self, address: u64) -> bool {
        (self.base..=self.end()).contains(&address)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanEntry {
    pub address: u64,
    pub value: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GraphEdge {
    pub from: u64,
    pub to: u64,
}

/// `"0x..." -> "0x..."`, the digraph edge statement.
impl fmt::Display for GraphEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{:#x}\" -> \"{:#x}\"", self.from, self.to)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapBounds {
    pub start: u64,
    pub end: u64,
}

#[inline]
pub fn is_comment(line: &str) -> bool {
    line.starts_with(COMMENT)
}

pub fn parse_hex(s: &str) -> Result<u64, ParseReason> {
    let s = s.trim();
    let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    u64::from_str_radix(digits, 16).map_err(|_| ParseReason::BadHex(s.to_string()))
}

pub fn parse_dec(s: &str) -> Result<u64, ParseReason> {
    let s = s.trim();
    s.parse().map_err(|_| ParseReason::BadDecimal(s.to_string()))
}

/// `[idx] ns malloc(ptr) size: type, ns, base, size`
///
/// Returns `None` for lines that are not malloc records. The kind never
/// starts a record line, so a line whose first `malloc` sits at offset zero
/// does not qualify.
pub fn decode_allocation(line: &str) -> Result<Option<AllocationRecord>, ParseReason> {
    if is_comment(line) || !line.find("malloc").is_some_and(|i| i > 0) {
        return Ok(None);
    }
    let payload = line.split(':').nth(1).ok_or(ParseReason::MissingPayload)?;
    let mut fields = payload.split(',').skip(2);
    let base = fields.next().ok_or(ParseReason::MissingField(2))?;
    let size = fields.next().ok_or(ParseReason::MissingField(3))?;
    Ok(Some(AllocationRecord { base: parse_dec(base)?, size: parse_dec(size)? }))
}

/// `address -> value`, both hex. Comments and blank lines yield `None`.
pub fn decode_scan(line: &str) -> Result<Option<ScanEntry>, ParseReason> {
    let line = line.trim();
    if line.is_empty() || is_comment(line) {
        return Ok(None);
    }
    let (address, value) = line.split_once(ARROW).ok_or(ParseReason::MissingArrow)?;
    Ok(Some(ScanEntry { address: parse_hex(address)?, value: parse_hex(value)? }))
}

/// Split a log into lines without requiring the whole stream to be UTF-8.
/// A line that does not decode comes back as `Err` with its lossy text.
pub fn log_lines<R: BufRead>(reader: R) -> impl Iterator<Item = io::Result<Result<String, String>>> {
    reader.split(b'\n').map(|line| {
        let mut line = line?;
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Ok(String::from_utf8(line).map_err(|e| String::from_utf8_lossy(e.as_bytes()).into_owned()))
    })
}

#[inline]
pub fn is_free(line: &str) -> bool {
    !is_comment(line) && line.contains(" free(")
}

/// `# Heap Bounds [0x...-0x...] (start end)`, decimal pair in parentheses.
pub fn decode_heap_bounds(line: &str) -> Option<HeapBounds> {
    let rest = line.strip_prefix(COMMENT)?.trim_start().strip_prefix("Heap Bounds")?;
    let (_, pair) = rest.split_once('(')?;
    let (start, end) = pair.trim_end().strip_suffix(')')?.split_once(' ')?;
    Some(HeapBounds { start: parse_dec(start).ok()?, end: parse_dec(end).ok()? })
}

/// `# Scanning heap range: 0x... to 0x...`
pub fn decode_scan_range(line: &str) -> Option<HeapBounds> {
    let rest = line.strip_prefix(COMMENT)?.trim_start().strip_prefix("Scanning heap range:")?;
    let (start, end) = rest.split_once(" to ")?;
    Some(HeapBounds { start: parse_hex(start).ok()?, end: parse_hex(end).ok()? })
}

#[test]
fn test_decode_allocation() {
    let line = "[3] 1700 malloc(0x1067) 16: 0, 1700, 4199, 16";
    assert_eq!(decode_allocation(line), Ok(Some(AllocationRecord { base: 4199, size: 16 })));

    assert_eq!(decode_allocation("[4] 1800 free(0x1067) 0: 1, 1800, 4199, 0"), Ok(None));
    assert_eq!(decode_allocation("# CSV Format: Malloc/Free (as 0 or 1), malloc"), Ok(None));
    assert_eq!(decode_allocation("malloc at the start"), Ok(None));
    assert_eq!(decode_allocation("malloc[0] 1 malloc(0x10) 16: 0, 1, 4199, 16"), Ok(None));
    assert_eq!(
        decode_allocation("é[0] 1 malloc(0x10) 16: 0, 1, 4199, 16"),
        Ok(Some(AllocationRecord { base: 4199, size: 16 }))
    );
    assert_eq!(decode_allocation(""), Ok(None));
}

#[test]
fn test_decode_allocation_errors() {
    assert_eq!(decode_allocation("[0] 1 malloc(0x10) 16"), Err(ParseReason::MissingPayload));
    assert_eq!(decode_allocation("[0] 1 malloc(0x10) 16: 0, 1"), Err(ParseReason::MissingField(2)));
    assert_eq!(decode_allocation("[0] 1 malloc(0x10) 16: 0, 1, 16"), Err(ParseReason::MissingField(3)));
    assert_eq!(
        decode_allocation("[0] 1 malloc(0x10) 16: 0, 1, 0x10, 16"),
        Err(ParseReason::BadDecimal("0x10".to_string()))
    );
}

#[test]
fn test_log_lines() {
    let lines = log_lines(&b"0x10 -> 0x20\r\n0x10\xff -> 0x20\nlast"[..]).map(|l| l.unwrap()).collect::<Vec<_>>();
    assert_eq!(
        lines,
        [Ok("0x10 -> 0x20".to_string()), Err("0x10\u{fffd} -> 0x20".to_string()), Ok("last".to_string())]
    );
}

#[test]
fn test_decode_scan() {
    assert_eq!(decode_scan("0x1070 -> 0x20"), Ok(Some(ScanEntry { address: 0x1070, value: 0x20 })));
    assert_eq!(decode_scan("  0X1070->ff \n"), Ok(Some(ScanEntry { address: 0x1070, value: 0xff })));
    assert_eq!(decode_scan("# Scanning heap range: 0x1000 to 0x2000"), Ok(None));
    assert_eq!(decode_scan("   "), Ok(None));
    assert_eq!(decode_scan("0x1070 0x20"), Err(ParseReason::MissingArrow));
    assert_eq!(decode_scan("0x1070 -> zz"), Err(ParseReason::BadHex("zz".to_string())));
}

#[test]
fn test_inclusive_end() {
    let rec = AllocationRecord { base: 4199, size: 16 };
    assert!(rec.contains(4199));
    assert!(rec.contains(4215));
    assert!(!rec.contains(4216));
    assert!(!rec.contains(4198));

    let rec = AllocationRecord { base: u64::MAX - 1, size: 16 };
    assert_eq!(rec.end(), u64::MAX);
    assert!(rec.contains(u64::MAX));
}

#[test]
fn test_decode_bounds() {
    assert_eq!(
        decode_heap_bounds("# Heap Bounds [0x1000-0x2000] (4096 8192)"),
        Some(HeapBounds { start: 4096, end: 8192 })
    );
    assert_eq!(
        decode_scan_range("# Scanning heap range: 0x1000 to 0x2000"),
        Some(HeapBounds { start: 0x1000, end: 0x2000 })
    );
    assert_eq!(decode_heap_bounds("# CSV Format: Malloc/Free"), None);
    assert_eq!(decode_scan_range("0x1000 -> 0x2000"), None);
}
