//! Praat TextGrid interchange.
//!
//! Writes the four interval tiers (`SpeakerA`, `SpeakerB`, `Overlap`,
//! `Leak`) in long TextGrid format, and parses the same tiers back from
//! reference files.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result};

use crate::decode::Segment;

/// Tier names in file order.
pub const TIER_NAMES: [&str; 4] = ["SpeakerA", "SpeakerB", "Overlap", "Leak"];

fn tier_block(out: &mut String, index: usize, name: &str, segments: &[Segment]) {
    let xmax = segments.last().map_or(0.0, |s| s.end_time);
    let _ = writeln!(out, "    item [{index}]:");
    let _ = writeln!(out, "        class = \"IntervalTier\"");
    let _ = writeln!(out, "        name = \"{name}\"");
    let _ = writeln!(out, "        xmin = 0");
    let _ = writeln!(out, "        xmax = {xmax}");
    let _ = writeln!(out, "        intervals: size = {}", segments.len());
    for (i, seg) in segments.iter().enumerate() {
        let _ = writeln!(out, "        intervals [{}]:", i + 1);
        let _ = writeln!(out, "            xmin = {}", seg.start_time);
        let _ = writeln!(out, "            xmax = {}", seg.end_time);
        let _ = writeln!(out, "            text = \"{}\"", seg.label);
    }
}

/// Write the four decoded tiers as a Praat TextGrid.
pub fn write_textgrid(
    path: &Path,
    speaker_a: &[Segment],
    speaker_b: &[Segment],
    overlap: &[Segment],
    leak: &[Segment],
) -> Result<()> {
    let tiers: [(&str, &[Segment]); 4] = [
        (TIER_NAMES[0], speaker_a),
        (TIER_NAMES[1], speaker_b),
        (TIER_NAMES[2], overlap),
        (TIER_NAMES[3], leak),
    ];
    let xmax = tiers
        .iter()
        .flat_map(|(_, segs)| segs.iter())
        .map(|s| s.end_time)
        .fold(0.0f64, f64::max);

    let mut out = String::new();
    let _ = writeln!(out, "File type = \"ooTextFile\"");
    let _ = writeln!(out, "Object class = \"TextGrid\"");
    let _ = writeln!(out);
    let _ = writeln!(out, "xmin = 0");
    let _ = writeln!(out, "xmax = {xmax}");
    let _ = writeln!(out, "tiers? <exists>");
    let _ = writeln!(out, "size = {}", tiers.len());
    let _ = writeln!(out, "item []:");
    for (i, (name, segments)) in tiers.iter().enumerate() {
        tier_block(&mut out, i + 1, name, segments);
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(path, out)
        .with_context(|| format!("failed to write TextGrid {}", path.display()))
}

/// Parse the known tiers from a TextGrid file.
///
/// Only non-empty interval texts are kept; unknown tiers are ignored.
pub fn parse_textgrid(path: &Path) -> Result<BTreeMap<String, Vec<Segment>>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read TextGrid {}", path.display()))?;

    let mut tiers: BTreeMap<String, Vec<Segment>> = TIER_NAMES
        .iter()
        .map(|&name| (name.to_string(), Vec::new()))
        .collect();

    let mut current: Option<String> = None;
    let mut xmin = 0.0f64;
    let mut xmax = 0.0f64;
    for raw in content.lines() {
        let line = raw.trim();
        if let Some(rest) = line.strip_prefix("name =") {
            current = Some(rest.trim().trim_matches('"').to_string());
        } else if let Some(rest) = line.strip_prefix("xmin =") {
            xmin = rest.trim().parse().unwrap_or(0.0);
        } else if let Some(rest) = line.strip_prefix("xmax =") {
            xmax = rest.trim().parse().unwrap_or(0.0);
        } else if let Some(rest) = line.strip_prefix("text =") {
            let text = rest.trim().trim_matches('"');
            if text.is_empty() {
                continue;
            }
            if let Some(tier) = current.as_ref().and_then(|name| tiers.get_mut(name)) {
                tier.push(Segment::new(xmin, xmax, text));
            }
        }
    }
    Ok(tiers)
}
