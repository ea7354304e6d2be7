use std::{
    fs::File,
    io::{self, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
    thread,
};

use anyhow::{Context, Result};
use argh::{FromArgValue, FromArgs};
use heapgraph::{write_digraph, AllocationTable, IntervalIndex, OwnerLookup, ParseMode, Resolver, ScanGraph};
use rayon::{ThreadPool, ThreadPoolBuilder};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Linear,
    #[default]
    Interval,
}

impl FromArgValue for Lookup {
    fn from_arg_value(value: &str) -> Result<Self, String> {
        match value {
            "linear" => Ok(Self::Linear),
            "interval" => Ok(Self::Interval),
            _ => Err(format!("unknown lookup `{value}`, expected `linear` or `interval`")),
        }
    }
}

#[derive(FromArgs, Debug)]
#[argh(description = "build a pointer digraph from a heap allocation log and a heap scan log")]
pub struct HeapGraph {
    #[argh(positional, description = "allocation log (sniff.log)")]
    pub alloc_log: PathBuf,

    #[argh(positional, description = "heap scan log (sniff_scan1.log)")]
    pub scan_log: PathBuf,

    #[argh(option, short = 'o', description = "output to file path instead of stdout")]
    pub output: Option<PathBuf>,

    #[argh(switch, description = "skip malformed lines instead of aborting")]
    pub lenient: bool,

    #[argh(option, default = "Lookup::default()", description = "owner lookup: linear or interval")]
    pub index: Lookup,

    #[argh(switch, description = "resolve scan entries in parallel")]
    pub parallel: bool,

    #[argh(option, description = "worker threads for --parallel")]
    pub threads: Option<usize>,
}

pub fn rayon_create_pool(num_threads: Option<usize>) -> Result<ThreadPool> {
    let num_cpus = thread::available_parallelism()?.get();
    let num = num_threads.map_or(num_cpus, |n| n.clamp(1, num_cpus));
    let pool = ThreadPoolBuilder::new().num_threads(num).build()?;
    Ok(pool)
}

impl HeapGraph {
    pub fn init(self) -> Result<()> {
        let Self { alloc_log, scan_log, output, lenient, index, parallel, threads } = self;
        let mode = if lenient { ParseMode::Lenient } else { ParseMode::Strict };
        if threads.is_some() && !parallel {
            log::warn!("--threads has no effect without --parallel");
        }

        let table = AllocationTable::load(open(&alloc_log)?, mode)
            .with_context(|| format!("failed to load allocation log {}", alloc_log.display()))?;
        let stats = table.stats();
        log::info!(
            "{}: {} allocations, {} frees ignored",
            alloc_log.display(),
            stats.mallocs,
            stats.frees
        );

        let graph = match index {
            Lookup::Linear => resolve(&table, &scan_log, mode, parallel, threads)?,
            Lookup::Interval => resolve(IntervalIndex::new(&table), &scan_log, mode, parallel, threads)?,
        };
        log::info!("{}: {} edges", scan_log.display(), graph.edges.len());
        if let (Some(heap), Some(scan)) = (table.heap_bounds(), graph.bounds) {
            if heap != scan {
                log::info!(
                    "heap bounds {:#x}-{:#x} differ from scan range {:#x}-{:#x}",
                    heap.start,
                    heap.end,
                    scan.start,
                    scan.end
                );
            }
        }

        match output {
            Some(path) => {
                let file = File::create(&path).with_context(|| format!("failed to create {}", path.display()))?;
                emit(&graph, file)
            }
            None => emit(&graph, io::stdout().lock()),
        }
    }
}

fn open(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    Ok(BufReader::new(file))
}

fn resolve<L>(lookup: L, scan_log: &Path, mode: ParseMode, parallel: bool, threads: Option<usize>) -> Result<ScanGraph>
where
    L: OwnerLookup + Sync,
{
    let resolver = Resolver::new(lookup);
    let reader = open(scan_log)?;
    let graph = match parallel {
        true => rayon_create_pool(threads)?.install(|| resolver.resolve_all_parallel(reader, mode)),
        false => resolver.resolve_all(reader, mode),
    };
    graph.with_context(|| format!("failed to resolve scan log {}", scan_log.display()))
}

fn emit<W: Write>(graph: &ScanGraph, w: W) -> Result<()> {
    let mut w = BufWriter::new(w);
    write_digraph(&graph.edges, &mut w)?;
    w.flush()?;
    Ok(())
}

#[test]
fn test_lookup_from_arg_value() {
    assert_eq!(Lookup::from_arg_value("linear"), Ok(Lookup::Linear));
    assert_eq!(Lookup::from_arg_value("interval"), Ok(Lookup::Interval));
    assert!(Lookup::from_arg_value("tree").is_err());
}

#[test]
fn test_parse_args() {
    let args =
        HeapGraph::from_args(&["heapgraph"], &["sniff.log", "sniff_scan1.log", "--index", "linear", "--parallel"])
            .unwrap();
    assert_eq!(args.alloc_log, PathBuf::from("sniff.log"));
    assert_eq!(args.scan_log, PathBuf::from("sniff_scan1.log"));
    assert_eq!(args.index, Lookup::Linear);
    assert!(args.parallel);
    assert!(!args.lenient);
    assert_eq!(args.output, None);

    assert!(HeapGraph::from_args(&["heapgraph"], &["sniff.log"]).is_err());
    assert!(HeapGraph::from_args(&["heapgraph"], &["a", "b", "c"]).is_err());
}
