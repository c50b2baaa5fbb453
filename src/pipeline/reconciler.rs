//! Segment reconciler: merges engine fragments into sentence-level
//! segments and suppresses duplicates against the accepted history.
//!
//! Runs on the consuming side of the result queue, single-threaded, from a
//! periodic drain. Two policies apply in order: intra-batch merge, then
//! duplicate suppression.

use crate::defaults;
use crate::pipeline::types::Segment;
use crossbeam_channel::Receiver;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Configuration for merge and duplicate policies.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Maximum gap between fragments that still merges, in seconds.
    pub merge_gap_seconds: f64,
    /// Fragments shorter than this merge even after a terminator.
    pub min_sentence_chars: usize,
    /// Start-time window for duplicate detection, in seconds.
    pub duplicate_window_seconds: f64,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            merge_gap_seconds: defaults::MERGE_GAP_SECONDS,
            min_sentence_chars: defaults::MIN_SENTENCE_CHARS,
            duplicate_window_seconds: defaults::DUPLICATE_WINDOW_SECONDS,
        }
    }
}

/// Merges fragments, filters duplicates, and owns the accepted history.
pub struct SegmentReconciler {
    config: ReconcilerConfig,
    language: Arc<RwLock<String>>,
    history: Vec<Segment>,
}

impl SegmentReconciler {
    pub fn new(language: Arc<RwLock<String>>) -> Self {
        Self::with_config(language, ReconcilerConfig::default())
    }

    pub fn with_config(language: Arc<RwLock<String>>, config: ReconcilerConfig) -> Self {
        Self {
            config,
            language,
            history: Vec::new(),
        }
    }

    /// Accepted history, ascending by id.
    pub fn history(&self) -> &[Segment] {
        &self.history
    }

    /// Clears the accepted history (explicit full reset).
    pub fn reset(&mut self) {
        self.history.clear();
    }

    fn current_language(&self) -> String {
        match self.language.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Pops all currently available result batches and reconciles them.
    ///
    /// Returns the newly accepted segments, appended to history in
    /// ascending start order and renumbered sequentially.
    pub fn drain(&mut self, rx: &Receiver<Vec<Segment>>) -> Vec<Segment> {
        let mut fragments: Vec<Segment> = Vec::new();
        while let Ok(batch) = rx.try_recv() {
            fragments.extend(batch);
        }
        self.accept(fragments)
    }

    /// Reconciles a batch of raw fragments.
    pub fn accept(&mut self, fragments: Vec<Segment>) -> Vec<Segment> {
        if fragments.is_empty() {
            return Vec::new();
        }

        let before = fragments.len();
        let merged = self.merge_fragments(fragments);

        let mut accepted: Vec<Segment> = Vec::new();
        for candidate in merged {
            if self.is_duplicate(&candidate, &accepted) {
                debug!(text = %candidate.text, start_secs = candidate.start_secs, "duplicate segment skipped");
                continue;
            }
            accepted.push(candidate);
        }

        accepted.sort_by(|a, b| a.start_secs.total_cmp(&b.start_secs));
        for segment in &mut accepted {
            segment.id = self.history.len() as u64 + 1;
            self.history.push(segment.clone());
        }

        debug!(
            fragments = before,
            accepted = accepted.len(),
            history = self.history.len(),
            "segments reconciled"
        );
        accepted
    }

    /// Coalesces adjacent fragments into sentence-level segments.
    ///
    /// Two fragments merge when the gap between them is below the
    /// configured threshold AND the prior text either lacks a
    /// sentence-terminal character or is still short. Confidence becomes
    /// the mean of the merged pair.
    fn merge_fragments(&self, fragments: Vec<Segment>) -> Vec<Segment> {
        let with_space = defaults::joins_with_space(&self.current_language());
        let mut merged: Vec<Segment> = Vec::new();
        let mut current: Option<Segment> = None;

        for fragment in fragments {
            let text = fragment.text.trim().to_string();
            if text.is_empty() {
                continue;
            }

            match current.take() {
                None => {
                    current = Some(Segment {
                        text,
                        ..fragment
                    });
                }
                Some(mut prev) => {
                    let gap = fragment.start_secs - prev.end_secs;
                    let prev_text = prev.text.trim_end();
                    let ends_sentence = prev_text
                        .chars()
                        .next_back()
                        .is_some_and(|c| defaults::SENTENCE_TERMINATORS.contains(&c));
                    let short = prev_text.chars().count() < self.config.min_sentence_chars;

                    if gap < self.config.merge_gap_seconds && (!ends_sentence || short) {
                        let joined = if with_space {
                            format!("{} {}", prev_text, text)
                        } else {
                            format!("{}{}", prev_text, text)
                        };
                        prev.text = joined;
                        prev.end_secs = fragment.end_secs;
                        prev.confidence = (prev.confidence + fragment.confidence) / 2.0;
                        current = Some(prev);
                    } else {
                        merged.push(prev);
                        current = Some(Segment {
                            text,
                            ..fragment
                        });
                    }
                }
            }
        }

        if let Some(last) = current {
            merged.push(last);
        }
        merged
    }

    /// A candidate is a duplicate when history, or an earlier candidate of
    /// the same batch, holds identical trimmed text within the start-time
    /// window.
    fn is_duplicate(&self, candidate: &Segment, accepted_in_batch: &[Segment]) -> bool {
        let text = candidate.text.trim();
        let window = self.config.duplicate_window_seconds;

        self.history
            .iter()
            .chain(accepted_in_batch.iter())
            .any(|existing| {
                existing.text.trim() == text
                    && (existing.start_secs - candidate.start_secs).abs() < window
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    fn reconciler(language: &str) -> SegmentReconciler {
        SegmentReconciler::new(Arc::new(RwLock::new(language.to_string())))
    }

    fn frag(start: f64, end: f64, text: &str) -> Segment {
        Segment::new(0, start, end, text, -0.5)
    }

    #[test]
    fn close_fragments_merge_with_space_for_english() {
        let mut rec = reconciler("en");
        let accepted = rec.accept(vec![frag(0.0, 1.0, "Hello"), frag(1.2, 2.0, "world")]);

        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].text, "Hello world");
        assert_eq!(accepted[0].start_secs, 0.0);
        assert_eq!(accepted[0].end_secs, 2.0);
    }

    #[test]
    fn close_fragments_merge_without_space_for_japanese() {
        let mut rec = reconciler("ja");
        let accepted = rec.accept(vec![
            frag(0.0, 1.0, "こんにちは"),
            frag(1.2, 2.0, "世界のみなさん"),
        ]);

        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].text, "こんにちは世界のみなさん");
    }

    #[test]
    fn merged_confidence_is_the_mean() {
        let mut rec = reconciler("en");
        let mut a = frag(0.0, 1.0, "Hello");
        a.confidence = -0.2;
        let mut b = frag(1.2, 2.0, "world");
        b.confidence = -0.6;

        let accepted = rec.accept(vec![a, b]);
        assert!((accepted[0].confidence + 0.4).abs() < 1e-6);
    }

    #[test]
    fn wide_gap_blocks_merge() {
        let mut rec = reconciler("en");
        let accepted = rec.accept(vec![frag(0.0, 1.0, "Hello"), frag(2.5, 3.0, "world")]);
        assert_eq!(accepted.len(), 2);
    }

    #[test]
    fn sentence_terminator_blocks_merge_for_long_text() {
        let mut rec = reconciler("en");
        let accepted = rec.accept(vec![
            frag(0.0, 1.0, "This is a full sentence."),
            frag(1.2, 2.0, "Next one"),
        ]);
        assert_eq!(accepted.len(), 2);
    }

    #[test]
    fn short_text_merges_even_after_terminator() {
        let mut rec = reconciler("en");
        let accepted = rec.accept(vec![frag(0.0, 1.0, "Yes."), frag(1.2, 2.0, "Indeed it is")]);
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].text, "Yes. Indeed it is");
    }

    #[test]
    fn fullwidth_terminator_blocks_merge_for_japanese() {
        let mut rec = reconciler("ja");
        let accepted = rec.accept(vec![
            frag(0.0, 1.0, "今日はいい天気ですね。"),
            frag(1.2, 2.0, "会議を始めます"),
        ]);
        assert_eq!(accepted.len(), 2);
    }

    #[test]
    fn whitespace_only_fragments_are_ignored() {
        let mut rec = reconciler("en");
        let accepted = rec.accept(vec![
            frag(0.0, 1.0, "Hello"),
            frag(1.1, 1.2, "   "),
            frag(1.3, 2.0, "world"),
        ]);
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].text, "Hello world");
    }

    #[test]
    fn duplicate_against_history_is_dropped() {
        let mut rec = reconciler("ja");
        rec.accept(vec![frag(4.6, 5.6, "こんにちは")]);
        assert_eq!(rec.history().len(), 1);

        // Same text 0.4s away — duplicate
        let accepted = rec.accept(vec![frag(5.0, 6.0, "こんにちは")]);
        assert!(accepted.is_empty());
        assert_eq!(rec.history().len(), 1);
    }

    #[test]
    fn same_text_far_apart_is_kept() {
        let mut rec = reconciler("ja");
        rec.accept(vec![frag(4.6, 5.6, "こんにちは")]);

        let accepted = rec.accept(vec![frag(10.0, 11.0, "こんにちは")]);
        assert_eq!(accepted.len(), 1);
        assert_eq!(rec.history().len(), 2);
    }

    #[test]
    fn batch_cannot_admit_its_own_duplicate() {
        let mut rec = reconciler("en");
        // Far enough apart not to merge, close enough to be duplicates
        let accepted = rec.accept(vec![
            frag(0.0, 1.0, "Duplicate sentence here."),
            frag(0.5, 1.5, "Duplicate sentence here."),
        ]);
        assert_eq!(accepted.len(), 1);
    }

    #[test]
    fn accepted_segments_are_sorted_and_renumbered() {
        let mut rec = reconciler("en");
        rec.accept(vec![frag(0.0, 1.0, "This is the first sentence.")]);

        let accepted = rec.accept(vec![
            frag(20.0, 21.0, "A much later long sentence."),
            frag(10.0, 11.0, "An earlier long sentence."),
        ]);

        assert_eq!(accepted.len(), 2);
        assert!(accepted[0].start_secs < accepted[1].start_secs);
        assert_eq!(accepted[0].id, 2);
        assert_eq!(accepted[1].id, 3);
        assert_eq!(rec.history().len(), 3);
        assert_eq!(rec.history()[0].id, 1);
    }

    #[test]
    fn drain_pops_all_available_batches() {
        let mut rec = reconciler("en");
        let (tx, rx) = unbounded();

        tx.send(vec![frag(0.0, 1.0, "This is sentence one.")])
            .unwrap();
        tx.send(vec![frag(5.0, 6.0, "This is sentence two.")])
            .unwrap();

        let accepted = rec.drain(&rx);
        assert_eq!(accepted.len(), 2);

        // Nothing left
        assert!(rec.drain(&rx).is_empty());
    }

    #[test]
    fn reset_clears_history() {
        let mut rec = reconciler("en");
        rec.accept(vec![frag(0.0, 1.0, "Some accepted sentence.")]);
        assert!(!rec.history().is_empty());

        rec.reset();
        assert!(rec.history().is_empty());

        // Previously duplicate text is accepted again after reset
        let accepted = rec.accept(vec![frag(0.0, 1.0, "Some accepted sentence.")]);
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].id, 1);
    }

    #[test]
    fn empty_batch_is_noop() {
        let mut rec = reconciler("en");
        assert!(rec.accept(Vec::new()).is_empty());
        assert!(rec.history().is_empty());
    }
}
