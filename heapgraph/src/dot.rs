use std::io::{self, Write};

use super::record::GraphEdge;

/// Write `edges` as a graphviz digraph, one quoted `0x` node pair per line.
pub fn write_digraph<'a, I, W>(edges: I, w: &mut W) -> io::Result<()>
where
    I: IntoIterator<Item = &'a GraphEdge>,
    W: Write,
{
    writeln!(w, "digraph {{")?;
    edges.into_iter().try_for_each(|edge| writeln!(w, "{edge}"))?;
    writeln!(w, "}}")
}

pub fn render_digraph<'a, I>(edges: I) -> String
where
    I: IntoIterator<Item = &'a GraphEdge>,
{
    let body = edges.into_iter().map(|edge| format!("{edge}\n")).collect::<String>();
    format!("digraph {{\n{body}}}\n")
}

#[test]
fn test_render_empty_digraph() {
    let edges: [GraphEdge; 0] = [];
    assert_eq!(render_digraph(&edges), "digraph {\n}\n");
}

#[test]
fn test_render_digraph() {
    let edges = [
        GraphEdge { from: 4199, to: 0x20 },
        GraphEdge { from: 0x99999, to: 0x1 },
        GraphEdge { from: 0, to: 0xDEADBEEF },
    ];
    assert_eq!(
        render_digraph(&edges),
        "digraph {\n\"0x1067\" -> \"0x20\"\n\"0x99999\" -> \"0x1\"\n\"0x0\" -> \"0xdeadbeef\"\n}\n"
    );
}

#[test]
fn test_hex_labels_round_trip() {
    use super::record::decode_scan;

    for line in ["0x1070 -> 0x20", "0x7ffd12ab -> 0x55aa00", "0x0 -> 0xffffffffffffffff"] {
        let entry = decode_scan(line).unwrap().unwrap();
        let out = render_digraph(&[GraphEdge { from: entry.address, to: entry.value }]);
        let (from, to) = line.split_once(" -> ").unwrap();
        assert_eq!(out, format!("digraph {{\n\"{from}\" -> \"{to}\"\n}}\n"));
    }
}

#[test]
fn test_write_matches_render() {
    let edges = [GraphEdge { from: 0x1067, to: 0x1080 }, GraphEdge { from: 0x1080, to: 0x1067 }];
    let mut out = Vec::new();
    write_digraph(&edges, &mut out).unwrap();
    assert_eq!(String::from_utf8(out).unwrap(), render_digraph(&edges));
}
