use crate::card::{Card, Rank};
use serde::Serialize;
use std::collections::BTreeMap;

/// The recognised play shapes. Run-based shapes carry their run length so two
/// patterns only compare when their shapes match exactly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "len")]
pub enum PatternKind {
    Single,
    Pair,
    Triple,
    TripleWithSingle,
    TripleWithPair,
    Straight(usize),
    PairStraight(usize),
    Plane(usize),
    PlaneWithSingles(usize),
    PlaneWithPairs(usize),
    FourWithTwo,
    FourWithTwoPairs,
    Bomb,
    Rocket,
}

impl PatternKind {
    pub fn name(&self) -> &'static str {
        match self {
            PatternKind::Single => "Single",
            PatternKind::Pair => "Pair",
            PatternKind::Triple => "Triple",
            PatternKind::TripleWithSingle => "Triple with single",
            PatternKind::TripleWithPair => "Triple with pair",
            PatternKind::Straight(_) => "Straight",
            PatternKind::PairStraight(_) => "Pair straight",
            PatternKind::Plane(_) => "Plane",
            PatternKind::PlaneWithSingles(_) => "Plane with singles",
            PatternKind::PlaneWithPairs(_) => "Plane with pairs",
            PatternKind::FourWithTwo => "Four with two",
            PatternKind::FourWithTwoPairs => "Four with two pairs",
            PatternKind::Bomb => "Bomb",
            PatternKind::Rocket => "Rocket",
        }
    }

    /// Bombs and rockets double the stake when played.
    pub fn is_bomb(&self) -> bool {
        matches!(self, PatternKind::Bomb | PatternKind::Rocket)
    }
}

/// A validated play. Only [`classify`] builds these.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Pattern {
    kind: PatternKind,
    cards: Vec<Card>,
    main: Rank,
}

impl Pattern {
    fn new(kind: PatternKind, cards: &[Card], main: Rank) -> Self {
        let mut cards = cards.to_vec();
        cards.sort_by_key(|card| card.sort_key());
        Pattern { kind, cards, main }
    }

    pub fn kind(&self) -> PatternKind {
        self.kind
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// Rank of the primary component; the lowest rank for runs.
    pub fn main_rank(&self) -> Rank {
        self.main
    }

    pub fn main_weight(&self) -> u8 {
        self.main.weight()
    }

    /// Whether this pattern may be laid on top of `incumbent`. Anything opens
    /// an empty table.
    pub fn can_beat(&self, incumbent: Option<&Pattern>) -> bool {
        let Some(other) = incumbent else {
            return true;
        };
        match (self.kind, other.kind) {
            (PatternKind::Rocket, _) => true,
            (_, PatternKind::Rocket) => false,
            (PatternKind::Bomb, PatternKind::Bomb) => self.main > other.main,
            (PatternKind::Bomb, _) => true,
            (_, PatternKind::Bomb) => false,
            (mine, theirs) => {
                mine == theirs && self.len() == other.len() && self.main > other.main
            }
        }
    }
}

fn counts_by_rank(cards: &[Card]) -> BTreeMap<Rank, usize> {
    let mut counts = BTreeMap::new();
    for card in cards.iter() {
        *counts.entry(card.rank()).or_insert(0) += 1;
    }
    counts
}

/// True when `ranks` (ascending) step by exactly one weight and stay below 2.
fn is_run(ranks: &[Rank]) -> bool {
    if !ranks.iter().all(|rank| rank.is_sequenceable()) {
        return false;
    }
    ranks
        .windows(2)
        .all(|pair| pair[1].weight() == pair[0].weight() + 1)
}

fn rank_with_count(counts: &BTreeMap<Rank, usize>, wanted: usize) -> Option<Rank> {
    counts
        .iter()
        .find(|(_, count)| **count == wanted)
        .map(|(rank, _)| *rank)
}

fn count_groups(counts: &BTreeMap<Rank, usize>, wanted: usize) -> usize {
    counts.values().filter(|count| **count == wanted).count()
}

/// Finds the lowest run of `len` consecutive ranks held at least three times.
fn find_plane_body(counts: &BTreeMap<Rank, usize>, len: usize) -> Option<Rank> {
    let triples: Vec<Rank> = counts
        .iter()
        .filter(|(_, count)| **count >= 3)
        .map(|(rank, _)| *rank)
        .collect();
    if triples.len() < len {
        return None;
    }
    triples
        .windows(len)
        .find(|window| is_run(window))
        .map(|window| window[0])
}

/// Recognises the pattern formed by `cards`, or `None` if they form no legal
/// play. The result does not depend on input order.
pub fn classify(cards: &[Card]) -> Option<Pattern> {
    if cards.is_empty() {
        return None;
    }
    let len = cards.len();
    let counts = counts_by_rank(cards);
    let ranks: Vec<Rank> = counts.keys().copied().collect();
    let lowest = ranks[0];
    let uniform = |size: usize| ranks.len() * size == len && counts.values().all(|c| *c == size);

    if len == 1 {
        return Some(Pattern::new(PatternKind::Single, cards, lowest));
    }

    if len == 2 && cards.iter().all(|card| card.rank().is_joker()) && ranks.len() == 2 {
        return Some(Pattern::new(PatternKind::Rocket, cards, Rank::BigJoker));
    }

    if ranks.len() == 1 {
        let kind = match len {
            2 => Some(PatternKind::Pair),
            3 => Some(PatternKind::Triple),
            4 => Some(PatternKind::Bomb),
            _ => None,
        };
        if let Some(kind) = kind {
            return Some(Pattern::new(kind, cards, lowest));
        }
    }

    if len == 4 && ranks.len() == 2 {
        if let Some(rank) = rank_with_count(&counts, 3) {
            return Some(Pattern::new(PatternKind::TripleWithSingle, cards, rank));
        }
    }

    if len == 5 && ranks.len() == 2 {
        if let (Some(rank), Some(_)) = (rank_with_count(&counts, 3), rank_with_count(&counts, 2)) {
            return Some(Pattern::new(PatternKind::TripleWithPair, cards, rank));
        }
    }

    if len >= 5 && uniform(1) && is_run(&ranks) {
        return Some(Pattern::new(PatternKind::Straight(len), cards, lowest));
    }

    if len >= 6 && len % 2 == 0 && uniform(2) && ranks.len() >= 3 && is_run(&ranks) {
        return Some(Pattern::new(
            PatternKind::PairStraight(ranks.len()),
            cards,
            lowest,
        ));
    }

    if len >= 6 && len % 3 == 0 && uniform(3) && ranks.len() >= 2 && is_run(&ranks) {
        return Some(Pattern::new(PatternKind::Plane(ranks.len()), cards, lowest));
    }

    if len >= 8 && len % 4 == 0 {
        let body = len / 4;
        if let Some(rank) = find_plane_body(&counts, body) {
            return Some(Pattern::new(
                PatternKind::PlaneWithSingles(body),
                cards,
                rank,
            ));
        }
    }

    if len >= 10 && len % 5 == 0 {
        let body = len / 5;
        if count_groups(&counts, 2) >= body {
            if let Some(rank) = find_plane_body(&counts, body) {
                return Some(Pattern::new(PatternKind::PlaneWithPairs(body), cards, rank));
            }
        }
    }

    if len == 6 {
        if let Some(rank) = rank_with_count(&counts, 4) {
            return Some(Pattern::new(PatternKind::FourWithTwo, cards, rank));
        }
    }

    if len == 8 && ranks.len() == 3 && count_groups(&counts, 2) == 2 {
        if let Some(rank) = rank_with_count(&counts, 4) {
            return Some(Pattern::new(PatternKind::FourWithTwoPairs, cards, rank));
        }
    }

    None
}
