//! Playback recording
//!
//! A frame is the tree as it stood before one token was applied, together
//! with how much of the input had been read. Frames hold the tree root by
//! `Arc`; since the builder's tree copies only the nodes on the path it
//! appends to, consecutive frames share every other subtree. Each token costs
//! at most one node copy per level of depth, each copy cloning a vector of
//! child handles, instead of a deep copy of the whole tree.
//!
//! The handle vectors are the cost to watch: a copied ancestor clones all of
//! its child handles, so appending under a node with `width` children costs
//! O(width). Over a whole playback that is O(N * width) handle copies, which
//! for N tokens appended under a single parent grows to O(N^2).

use parsetrail_dom::{DomTree, Node};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::sync::Arc;

/// One step of a playback
#[derive(Debug, Clone)]
pub struct PlaybackFrame {
    input: Arc<str>,
    consumed: usize,
    tree: Arc<Node>,
}

impl PlaybackFrame {
    /// Input read so far
    pub fn consumed_input_prefix(&self) -> &str {
        self.input.get(..self.consumed).unwrap_or_default()
    }

    /// Length of the consumed prefix in bytes
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    pub fn tree(&self) -> &Arc<Node> {
        &self.tree
    }
}

impl Serialize for PlaybackFrame {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("consumedInputPrefix", self.consumed_input_prefix())?;
        map.serialize_entry("treeSnapshot", self.tree.as_ref())?;
        map.end()
    }
}

/// Frames of one build, in token order
#[derive(Debug, Clone, Default)]
pub struct Playback {
    frames: Vec<PlaybackFrame>,
}

impl Playback {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&PlaybackFrame> {
        self.frames.get(index)
    }

    pub fn frames(&self) -> &[PlaybackFrame] {
        &self.frames
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PlaybackFrame> {
        self.frames.iter()
    }

    /// The frame holding the finished tree
    pub fn last(&self) -> Option<&PlaybackFrame> {
        self.frames.last()
    }
}

impl Serialize for Playback {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.frames.len()))?;
        for frame in &self.frames {
            seq.serialize_element(frame)?;
        }
        seq.end()
    }
}

impl<'a> IntoIterator for &'a Playback {
    type Item = &'a PlaybackFrame;
    type IntoIter = std::slice::Iter<'a, PlaybackFrame>;

    fn into_iter(self) -> Self::IntoIter {
        self.frames.iter()
    }
}

/// Collects frames while a tree is being built
#[derive(Debug)]
pub struct Recorder {
    input: Arc<str>,
    frames: Vec<PlaybackFrame>,
}

impl Recorder {
    pub fn new(input: &str) -> Self {
        Self {
            input: Arc::from(input),
            frames: Vec::new(),
        }
    }

    /// Record `tree` as it stands, with the first `consumed` bytes read
    pub fn record(&mut self, consumed: usize, tree: &DomTree) {
        let consumed = self.clamp(consumed);
        self.frames.push(PlaybackFrame {
            input: Arc::clone(&self.input),
            consumed,
            tree: tree.snapshot(),
        });
    }

    /// Number of frames recorded so far
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Append the final frame, covering the whole input
    pub fn finish(mut self, tree: &DomTree) -> Playback {
        let all = self.input.len();
        self.record(all, tree);
        Playback { frames: self.frames }
    }

    /// Keep prefixes inside the input and on a character boundary
    fn clamp(&self, consumed: usize) -> usize {
        let mut consumed = consumed.min(self.input.len());
        while !self.input.is_char_boundary(consumed) {
            consumed -= 1;
        }
        consumed
    }
}
