use std::io::BufRead;

use super::{
    error::{LogKind, ParseError, ParseReason, Result},
    record::{decode_allocation, decode_heap_bounds, is_comment, is_free, log_lines, AllocationRecord, HeapBounds},
    ParseMode,
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoadStats {
    pub mallocs: usize,
    pub frees: usize,
    pub comments: usize,
    pub other: usize,
}

/// Every malloc record of an allocation log, in log order. Frees are counted
/// but never applied, so a reused base shows up once per malloc.
#[derive(Debug, Default, Clone)]
pub struct AllocationTable {
    records: Vec<AllocationRecord>,
    bounds: Option<HeapBounds>,
    stats: LoadStats,
}

impl AllocationTable {
    pub fn load<R: BufRead>(reader: R, mode: ParseMode) -> Result<Self> {
        let mut table = Self::default();
        for (idx, line) in log_lines(reader).enumerate() {
            let line = match line? {
                Ok(line) => line,
                Err(content) => {
                    let reason = ParseReason::InvalidUtf8;
                    mode.reject(ParseError { log: LogKind::Allocation, line: idx + 1, content, reason })?;
                    continue;
                }
            };
            if is_comment(&line) {
                table.stats.comments += 1;
                if let Some(bounds) = decode_heap_bounds(&line) {
                    log::debug!("heap bounds {:#x}-{:#x}", bounds.start, bounds.end);
                    table.bounds = Some(bounds);
                }
                continue;
            }
            match decode_allocation(&line) {
                Ok(Some(record)) => {
                    table.stats.mallocs += 1;
                    table.records.push(record);
                }
                Ok(None) if is_free(&line) => table.stats.frees += 1,
                Ok(None) => table.stats.other += 1,
                Err(reason) => {
                    mode.reject(ParseError { log: LogKind::Allocation, line: idx + 1, content: line, reason })?
                }
            }
        }
        log::debug!(
            "loaded {} allocations ({} frees ignored, {} other lines)",
            table.stats.mallocs,
            table.stats.frees,
            table.stats.other
        );
        Ok(table)
    }

    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = AllocationRecord>,
    {
        let records = records.into_iter().collect::<Vec<_>>();
        let stats = LoadStats { mallocs: records.len(), ..Default::default() };
        Self { records, bounds: None, stats }
    }

    #[inline]
    pub fn records(&self) -> &[AllocationRecord] {
        &self.records
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[inline]
    pub fn heap_bounds(&self) -> Option<HeapBounds> {
        self.bounds
    }

    #[inline]
    pub fn stats(&self) -> LoadStats {
        self.stats
    }
}

#[cfg(test)]
const SNIFF_LOG: &str = "\
# Heap Bounds [0x1000-0x3000] (4096 12288)
# CSV Format: Malloc/Free (as 0 or 1), Nanoseconds, Base Address, Bytes Requested
[0] 100 malloc(0x1067) 16: 0, 100, 4199, 16
[1] 200 malloc(0x1080) 32: 0, 200, 4224, 32
[2] 300 free(0x1067) 0: 1, 300, 4199, 0
[3] 400 malloc(0x1067) 8: 0, 400, 4199, 8
";

#[test]
fn test_load_allocation_table() {
    let table = AllocationTable::load(SNIFF_LOG.as_bytes(), ParseMode::Strict).unwrap();
    assert_eq!(
        table.records(),
        [
            AllocationRecord { base: 4199, size: 16 },
            AllocationRecord { base: 4224, size: 32 },
            AllocationRecord { base: 4199, size: 8 },
        ]
    );
    assert_eq!(table.heap_bounds(), Some(HeapBounds { start: 4096, end: 12288 }));
    assert_eq!(table.stats(), LoadStats { mallocs: 3, frees: 1, comments: 2, other: 0 });
}

#[test]
fn test_load_allocation_table_fail_fast() {
    let log = "[0] 100 malloc(0x1067) 16: 0, 100, 4199, 16\n[1] 200 malloc(0x1080) 32: 0, 200, 4224\n";
    let err = AllocationTable::load(log.as_bytes(), ParseMode::Strict).unwrap_err();
    assert_eq!(
        err.to_string(),
        "allocation log line 2: missing csv field 3: `[1] 200 malloc(0x1080) 32: 0, 200, 4224`"
    );
}

#[test]
fn test_load_allocation_table_lenient() {
    let log = "[0] 100 malloc(0x1067) 16: 0, 100, 4199, 16\n[1] 200 malloc(0x1080) 32: 0, 200, abc, 32\n";
    let table = AllocationTable::load(log.as_bytes(), ParseMode::Lenient).unwrap();
    assert_eq!(table.records(), [AllocationRecord { base: 4199, size: 16 }]);
}

#[test]
fn test_load_allocation_table_invalid_utf8() {
    let log = &b"[0] 100 malloc(0x1067) 16: 0, 100, 4199, 16\n[1] 200 malloc(0x1080) 32: 0, 200, 42\xff4, 32\n"[..];

    let err = AllocationTable::load(log, ParseMode::Strict).unwrap_err();
    assert_eq!(
        err.to_string(),
        "allocation log line 2: invalid utf-8: `[1] 200 malloc(0x1080) 32: 0, 200, 42\u{fffd}4, 32`"
    );

    let table = AllocationTable::load(log, ParseMode::Lenient).unwrap();
    assert_eq!(table.records(), [AllocationRecord { base: 4199, size: 16 }]);
}
