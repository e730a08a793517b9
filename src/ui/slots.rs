//! Projection of a separation result onto the page's six audio players.

use serde::Serialize;
use std::path::PathBuf;

use crate::types::{Stem, StemConfig};

/// Number of audio players on the page; the largest configuration.
pub const SLOT_COUNT: usize = 6;

pub const DEFAULT_LABELS: [&str; SLOT_COUNT] = ["vocals", "drums", "bass", "guitar", "piano", "other"];

const LABELS_4: [&str; SLOT_COUNT] = ["vocals", "drums", "bass", "other", "", ""];
const LABELS_2: [&str; SLOT_COUNT] = ["vocals", "instrumental", "", "", "", ""];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotUpdate {
    pub index: usize,
    pub visible: bool,
    pub label: String,
    /// File to play. `None` clears the player.
    pub value: Option<PathBuf>,
}

fn label_table(config: &StemConfig) -> &'static [&'static str; SLOT_COUNT] {
    match config.stems {
        2 => &LABELS_2,
        4 => &LABELS_4,
        _ => &DEFAULT_LABELS,
    }
}

/// Label a slot shows even when hidden; never empty.
pub fn slot_label(config: &StemConfig, index: usize) -> &'static str {
    match label_table(config)[index] {
        "" => DEFAULT_LABELS[index],
        label => label,
    }
}

/// Slot updates for a finished separation: one visible player per stem, the
/// rest hidden and cleared.
pub fn render(stems: &[Stem], config: &StemConfig) -> [SlotUpdate; SLOT_COUNT] {
    std::array::from_fn(|i| match stems.get(i) {
        Some(stem) => SlotUpdate {
            index: i,
            visible: true,
            label: stem.name.clone(),
            value: Some(stem.path.clone()),
        },
        None => SlotUpdate {
            index: i,
            visible: false,
            label: slot_label(config, i).to_string(),
            value: None,
        },
    })
}

/// Slot updates for a change of the stem-count selector.
pub fn visibility(config: &StemConfig) -> [SlotUpdate; SLOT_COUNT] {
    let table = label_table(config);
    std::array::from_fn(|i| SlotUpdate {
        index: i,
        visible: !table[i].is_empty(),
        label: slot_label(config, i).to_string(),
        value: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::STEM_CONFIGS;

    fn fake_stems(names: &[&str]) -> Vec<Stem> {
        names
            .iter()
            .map(|n| Stem {
                name: n.to_string(),
                path: PathBuf::from(format!("/tmp/demucs_x/{n}.wav")),
            })
            .collect()
    }

    #[test]
    fn always_six_updates_with_matching_visible_count() {
        for config in STEM_CONFIGS.iter() {
            let names = &DEFAULT_LABELS[..config.stems];
            let updates = render(&fake_stems(names), config);
            assert_eq!(updates.len(), SLOT_COUNT);
            assert_eq!(updates.iter().filter(|u| u.visible).count(), config.stems);

            let vis = visibility(config);
            assert_eq!(vis.iter().filter(|u| u.visible).count(), config.stems);
            assert!(vis.iter().all(|u| !u.label.is_empty()));
        }
    }

    #[test]
    fn two_stem_hidden_slots_keep_default_labels() {
        let config = StemConfig::from_count(2).unwrap();
        let updates = render(&fake_stems(&["vocals", "instrumental"]), config);

        assert_eq!(updates[1].label, "instrumental");
        assert_eq!(updates[1].value, Some(PathBuf::from("/tmp/demucs_x/instrumental.wav")));
        let hidden: Vec<&str> = updates[2..].iter().map(|u| u.label.as_str()).collect();
        assert_eq!(hidden, ["bass", "guitar", "piano", "other"]);
        assert!(updates[2..].iter().all(|u| !u.visible && u.value.is_none()));
    }

    #[test]
    fn four_stem_visibility_labels() {
        let config = StemConfig::from_count(4).unwrap();
        let labels: Vec<String> = visibility(config).into_iter().map(|u| u.label).collect();
        assert_eq!(labels, ["vocals", "drums", "bass", "other", "piano", "other"]);
    }

    #[test]
    fn short_result_hides_trailing_slots() {
        let config = StemConfig::from_count(6).unwrap();
        let updates = render(&fake_stems(&["vocals"]), config);
        assert!(updates[0].visible);
        assert!(updates[1..].iter().all(|u| !u.visible));
        assert_eq!(updates[3].label, "guitar");
    }
}
