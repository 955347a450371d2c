//! Netlist node extraction and subcircuit synthesis.
//!
//! A correlation deck needs the transistor-level buffer as a subcircuit it
//! can instantiate. Vendor netlists arrive either already wrapped in
//! `.subckt ... .ends`, in which case the declared name and ports are used
//! as-is, or flat, in which case a port list is guessed from the node names
//! and a wrapper is written next to the deck.
//!
//! # Port guessing
//!
//! Node names are gathered from device lines, supply rails and device
//! parameter keywords are dropped, and the survivors are ranked by a fixed
//! list of conventional buffer port names. The four best become signal
//! ports; the supply-high and supply-low rails found in the source are
//! appended after them.
//!
//! Rail detection is a word-bounded scan for `vdd` and `vss` (then `gnd`,
//! then a bare `0`). It trusts naming conventions and is not a rail
//! analysis.

use crate::error::{SpiceError, SpiceResult};
use lib_types::write_atomic;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Instance lines whose first letter names a transistor-like device.
const DEVICE_LETTERS: &[char] = &['m', 'x', 'q', 'j'];

/// Node names never used as signal ports.
const RAIL_NAMES: &[&str] = &["vdd", "vss", "gnd", "0", "vcc", "vssio", "vddio", "ground", "supply"];

/// Device parameter keywords that look like node names.
const PARAM_KEYWORDS: &[&str] = &["pfet", "nfet", "w", "l", "m"];

/// Conventional buffer port names, best first.
const PORT_PRIORITY: &[&str] = &["in", "oe", "en", "enable", "out", "pad", "io", "in_sense", "sense"];

/// Signal ports kept ahead of the supply pins.
const MAX_SIGNAL_PORTS: usize = 4;

const DEFAULT_SUPPLY_HIGH: &str = "vdd";
const DEFAULT_SUPPLY_LOW: &str = "vss";

/// A subcircuit ready to be included into a deck.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubcircuitDescriptor {
    pub name: String,

    /// Ports in declaration order.
    pub pins: Vec<String>,

    /// File holding the `.subckt` definition.
    pub source: PathBuf,

    /// Whether `source` is a wrapper written by [`prepare_subcircuit`].
    pub synthesized: bool,
}

impl SubcircuitDescriptor {
    pub fn include_directive(&self) -> String {
        format!(".include '{}'", self.source.display())
    }
}

/// Output of [`synthesize_subcircuit`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SynthesizedSubcircuit {
    pub name: String,
    pub pins: Vec<String>,

    /// Complete wrapper text.
    pub text: String,
}

fn is_comment(line: &str) -> bool {
    line.starts_with('*')
}

fn is_directive(line: &str) -> bool {
    line.starts_with('.')
}

fn starts_with_keyword(line: &str, keyword: &str) -> bool {
    line.split_whitespace()
        .next()
        .is_some_and(|first| first.eq_ignore_ascii_case(keyword))
}

/// Declared name and ports of the first `.subckt` in `text`, if any.
///
/// `+` continuation lines extend the port list; `name=value` parameters and
/// a `params:` marker end it.
pub fn find_subckt(text: &str) -> Option<(String, Vec<String>)> {
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty() && !is_comment(l));

    let header = lines.by_ref().find(|l| starts_with_keyword(l, ".subckt"))?;
    let mut tokens: Vec<&str> = header.split_whitespace().skip(1).collect();
    for continuation in lines.take_while(|l| l.starts_with('+')) {
        tokens.extend(continuation.trim_start_matches('+').split_whitespace());
    }

    let mut tokens = tokens.into_iter();
    let name = tokens.next()?.to_string();
    let pins = tokens
        .take_while(|t| !t.contains('=') && !t.eq_ignore_ascii_case("params:"))
        .map(str::to_string)
        .collect();
    Some((name, pins))
}

/// Identifier-shaped runs in a token: `[A-Za-z_][A-Za-z0-9_]*`.
///
/// Runs that start with a digit are numbers (`1u`, `0.18`) and are skipped,
/// except a bare `0`, which callers treat as the ground node.
fn identifiers(token: &str) -> impl Iterator<Item = &str> {
    token
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|run| {
            !run.is_empty()
                && (*run == "0" || run.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_'))
        })
}

fn is_excluded(name: &str) -> bool {
    RAIL_NAMES.iter().chain(PARAM_KEYWORDS).any(|r| r.eq_ignore_ascii_case(name))
}

/// Candidate node names in first-seen order, case-insensitively unique.
pub fn extract_nodes(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut nodes = Vec::new();

    for line in text.lines().map(str::trim) {
        if line.is_empty() || is_comment(line) || is_directive(line) {
            continue;
        }

        let mut tokens = line.split_whitespace().peekable();
        let is_device = tokens
            .peek()
            .and_then(|first| first.chars().next())
            .is_some_and(|c| DEVICE_LETTERS.contains(&c.to_ascii_lowercase()));
        if is_device {
            tokens.next();
        }

        for token in tokens {
            let token = token.split('=').next().unwrap_or_default();
            for ident in identifiers(token) {
                if is_excluded(ident) {
                    continue;
                }
                if seen.insert(ident.to_ascii_lowercase()) {
                    nodes.push(ident.to_string());
                }
            }
        }
    }

    nodes
}

fn priority(name: &str) -> usize {
    PORT_PRIORITY
        .iter()
        .position(|p| p.eq_ignore_ascii_case(name))
        .unwrap_or(PORT_PRIORITY.len())
}

/// Rank nodes by [`PORT_PRIORITY`], unranked names alphabetically after.
pub fn rank_ports(nodes: &[String]) -> Vec<String> {
    let mut ranked: Vec<&String> = nodes.iter().collect();
    ranked.sort_by_cached_key(|n| (priority(n), n.to_ascii_lowercase()));

    let mut seen = HashSet::new();
    ranked
        .into_iter()
        .filter(|n| seen.insert(n.to_ascii_lowercase()))
        .take(MAX_SIGNAL_PORTS)
        .cloned()
        .collect()
}

/// First word-bounded, case-insensitive occurrence of `word`, in source casing.
fn find_word<'a>(text: &'a str, word: &str) -> Option<&'a str> {
    let is_ident = |c: char| c.is_ascii_alphanumeric() || c == '_';

    for line in text.lines() {
        if is_comment(line.trim_start()) {
            continue;
        }
        let lower = line.to_ascii_lowercase();
        let mut from = 0;
        while let Some(offset) = lower[from..].find(word) {
            let start = from + offset;
            let end = start + word.len();
            let before_ok = !lower[..start].chars().next_back().is_some_and(is_ident);
            let after_ok = !lower[end..].chars().next().is_some_and(is_ident);
            if before_ok && after_ok {
                return Some(&line[start..end]);
            }
            from = end;
        }
    }
    None
}

/// Whether any statement uses the bare ground node `0` as a whole token.
fn has_ground_node(text: &str) -> bool {
    text.lines()
        .map(str::trim)
        .filter(|line| !is_comment(line))
        .any(|line| line.split_whitespace().skip(1).any(|token| token == "0"))
}

/// Supply-high and supply-low node names as spelled in the source.
pub fn detect_supplies(text: &str) -> (String, String) {
    let high = find_word(text, "vdd").unwrap_or(DEFAULT_SUPPLY_HIGH).to_string();
    let low = find_word(text, "vss")
        .or_else(|| find_word(text, "gnd"))
        .or_else(|| has_ground_node(text).then_some("0"))
        .unwrap_or(DEFAULT_SUPPLY_LOW)
        .to_string();
    (high, low)
}

/// Netlist body with trailing `.ends`/`.end` lines removed.
fn strip_trailing_end(text: &str) -> &str {
    let mut body = text.trim_end();
    loop {
        let (head, last) = match body.rfind('\n') {
            Some(i) => (&body[..i], &body[i + 1..]),
            None => ("", body),
        };
        let last = last.trim();
        if last.eq_ignore_ascii_case(".end") || starts_with_keyword(last, ".ends") {
            body = head.trim_end();
        } else {
            return body;
        }
    }
}

/// Wrap a flat netlist in a `.subckt` named `name`.
pub fn synthesize_subcircuit(text: &str, name: &str) -> SynthesizedSubcircuit {
    let mut pins = rank_ports(&extract_nodes(text));
    if pins.is_empty() {
        tracing::warn!("Subcircuit '{}': no signal nodes found; only supply pins", name);
    }

    let (high, low) = detect_supplies(text);
    if !pins.iter().any(|p| p.eq_ignore_ascii_case(&high)) {
        pins.push(high.clone());
    }
    if !low.eq_ignore_ascii_case(&high) && !pins.iter().any(|p| p.eq_ignore_ascii_case(&low)) {
        pins.push(low);
    }

    let text = format!(
        "* Subcircuit wrapper generated by ibis-forge\n.subckt {} {}\n{}\n.ends {}\n",
        name,
        pins.join(" "),
        strip_trailing_end(text),
        name
    );

    tracing::debug!("Synthesized subcircuit '{}' with pins {:?}", name, pins);
    SynthesizedSubcircuit {
        name: name.to_string(),
        pins,
        text,
    }
}

/// Make a netlist includable as a subcircuit.
///
/// An already-wrapped netlist is referenced in place. A flat one is wrapped
/// and written atomically to `<output_dir>/<name>.sp`.
pub fn prepare_subcircuit(
    netlist: &Path,
    name: &str,
    output_dir: &Path,
) -> SpiceResult<SubcircuitDescriptor> {
    let text = std::fs::read_to_string(netlist).map_err(|e| SpiceError::io(netlist, e))?;

    if let Some((declared, pins)) = find_subckt(&text) {
        tracing::info!("Netlist {:?} already defines subcircuit '{}'", netlist, declared);
        return Ok(SubcircuitDescriptor {
            name: declared,
            pins,
            source: netlist.to_path_buf(),
            synthesized: false,
        });
    }

    let wrapped = synthesize_subcircuit(&text, name);
    let target = output_dir.join(format!("{}.sp", name));
    write_atomic(&target, wrapped.text.as_bytes()).map_err(|e| SpiceError::io(&target, e))?;
    tracing::info!("Wrote subcircuit '{}' to {:?}", name, target);

    Ok(SubcircuitDescriptor {
        name: wrapped.name,
        pins: wrapped.pins,
        source: target,
        synthesized: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLAT: &str = "\
* output stage
M1 out in VDD VDD pfet w=2u l=0.18u
M2 out in vss vss nfet w=1u l=0.18u
R1 out pad 50
X1 oe foo ctrl
.end
";

    #[test]
    fn test_port_priority() {
        let pins = rank_ports(&extract_nodes(FLAT));
        assert_eq!(pins, vec!["in", "oe", "out", "pad"]);

        let wrapped = synthesize_subcircuit(FLAT, "drv");
        assert_eq!(wrapped.pins, vec!["in", "oe", "out", "pad", "VDD", "vss"]);
    }

    #[test]
    fn test_excluded_names_and_numbers() {
        let nodes = extract_nodes("M1 d g 0 gnd nfet w=1u l=0.1u m=2\nC1 n1 0 1p\n");
        assert_eq!(nodes, vec!["d", "g", "C1", "n1"]);
    }

    #[test]
    fn test_unranked_sorted_alphabetically() {
        let nodes: Vec<String> = ["Zeta", "alpha", "OUT", "beta", "Alpha"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(rank_ports(&nodes), vec!["OUT", "alpha", "beta", "Zeta"]);
    }

    #[test]
    fn test_wrapper_text() {
        let wrapped = synthesize_subcircuit(FLAT, "drv");
        assert!(wrapped.text.contains(".subckt drv in oe out pad VDD vss\n"));
        assert!(wrapped.text.contains("X1 oe foo ctrl\n"));
        assert!(wrapped.text.trim_end().ends_with(".ends drv"));
        assert!(!wrapped.text.contains(".end\n"));
    }

    #[test]
    fn test_supply_detection() {
        assert_eq!(detect_supplies("M1 a b vddq vddq p\nM2 a b GND GND n"), ("vdd".into(), "GND".into()));
        assert_eq!(detect_supplies("R1 a 0 1k\nR2 a Vdd 1k"), ("Vdd".into(), "0".into()));
        // Word-bounded: vddcore does not count as vdd.
        assert_eq!(detect_supplies("R1 vddcore x 1k").0, "vdd");
    }

    #[test]
    fn test_parameter_zero_is_not_ground() {
        let text = "M1 out in VDD VDD pfet l=0.18u\nM2 out in n1 n1 nfet l=0.18u\n";
        assert!(!has_ground_node(text));
        assert_eq!(detect_supplies(text), ("VDD".into(), "vss".into()));

        let wrapped = synthesize_subcircuit(text, "drv");
        assert!(!wrapped.pins.iter().any(|p| p == "0"));
        assert_eq!(wrapped.pins.last().map(String::as_str), Some("vss"));
    }

    #[test]
    fn test_degenerate_netlist() {
        let wrapped = synthesize_subcircuit("* nothing here\n.end\n", "empty");
        assert_eq!(wrapped.pins, vec!["vdd", "vss"]);
    }

    #[test]
    fn test_existing_subckt_reused() {
        let text = "* vendor model\n.SUBCKT BUF_IO pad in oe vdd vss\n+ sense PARAMS: w=1\nM1 pad in vdd vdd p\n.ENDS\n";
        let (name, pins) = find_subckt(text).unwrap();
        assert_eq!(name, "BUF_IO");
        assert_eq!(pins, vec!["pad", "in", "oe", "vdd", "vss", "sense"]);
        assert!(find_subckt(FLAT).is_none());
    }

    #[test]
    fn test_prepare_subcircuit_files() {
        let dir = tempfile::tempdir().unwrap();

        let flat = dir.path().join("flat.sp");
        std::fs::write(&flat, FLAT).unwrap();
        let desc = prepare_subcircuit(&flat, "drv", &dir.path().join("out")).unwrap();
        assert!(desc.synthesized);
        assert_eq!(desc.source, dir.path().join("out/drv.sp"));
        assert!(std::fs::read_to_string(&desc.source).unwrap().contains(".subckt drv"));
        assert!(desc.include_directive().starts_with(".include '"));

        let wrapped = dir.path().join("wrapped.sp");
        std::fs::write(&wrapped, ".subckt BUF a b\nR1 a b 1\n.ends BUF\n").unwrap();
        let desc = prepare_subcircuit(&wrapped, "ignored", dir.path()).unwrap();
        assert!(!desc.synthesized);
        assert_eq!(desc.name, "BUF");
        assert_eq!(desc.source, wrapped);

        let err = prepare_subcircuit(&dir.path().join("missing.sp"), "x", dir.path()).unwrap_err();
        assert!(matches!(err, SpiceError::Io { .. }));
    }
}
