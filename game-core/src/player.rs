use crate::card::{parse_ranks, sort_hand, Card, Rank};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Role {
    Landlord,
    Farmer,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Player {
    pub id: String,
    pub name: String,
    hand: Vec<Card>,
    is_landlord: bool,
}

fn rank_counts<'a>(cards: impl IntoIterator<Item = &'a Card>) -> BTreeMap<Rank, usize> {
    let mut counts = BTreeMap::new();
    for card in cards {
        *counts.entry(card.rank()).or_insert(0) += 1;
    }
    counts
}

impl Player {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Player {
            id: id.into(),
            name: name.into(),
            hand: Vec::with_capacity(20),
            is_landlord: false,
        }
    }

    pub fn hand(&self) -> &[Card] {
        &self.hand
    }

    pub fn is_landlord(&self) -> bool {
        self.is_landlord
    }

    pub fn role(&self) -> Role {
        if self.is_landlord {
            Role::Landlord
        } else {
            Role::Farmer
        }
    }

    pub(crate) fn set_landlord(&mut self, is_landlord: bool) {
        self.is_landlord = is_landlord;
    }

    /// Adds dealt or bottom cards and re-sorts strongest first.
    pub(crate) fn take_cards(&mut self, cards: impl IntoIterator<Item = Card>) {
        self.hand.extend(cards);
        sort_hand(&mut self.hand);
    }

    pub(crate) fn clear_hand(&mut self) {
        self.hand.clear();
        self.is_landlord = false;
    }

    /// Multiset containment by rank; suits are irrelevant.
    pub fn has_cards(&self, selection: &[Card]) -> bool {
        let held = rank_counts(&self.hand);
        rank_counts(selection)
            .iter()
            .all(|(rank, wanted)| held.get(rank).copied().unwrap_or(0) >= *wanted)
    }

    /// Removes one card of the matching rank per selected card. Callers check
    /// [`Player::has_cards`] first.
    pub(crate) fn remove_cards(&mut self, selection: &[Card]) {
        for card in selection.iter() {
            if let Some(pos) = self.hand.iter().position(|c| c.rank() == card.rank()) {
                self.hand.remove(pos);
            }
        }
    }

    /// Resolves selection shorthand against this hand.
    ///
    /// The whole requested rank multiset is checked before any card is picked,
    /// so the result is either every requested card or `None`.
    pub fn parse_cards(&self, input: &str) -> Option<Vec<Card>> {
        let ranks = parse_ranks(input)?;
        if ranks.is_empty() {
            return None;
        }
        let mut wanted: BTreeMap<Rank, usize> = BTreeMap::new();
        for rank in ranks.iter() {
            *wanted.entry(*rank).or_insert(0) += 1;
        }
        let held = rank_counts(&self.hand);
        if wanted
            .iter()
            .any(|(rank, count)| held.get(rank).copied().unwrap_or(0) < *count)
        {
            return None;
        }

        let mut claimed = vec![false; self.hand.len()];
        let mut selection = Vec::with_capacity(ranks.len());
        for rank in ranks {
            let pos = self
                .hand
                .iter()
                .enumerate()
                .position(|(i, card)| !claimed[i] && card.rank() == rank)?;
            claimed[pos] = true;
            selection.push(self.hand[pos]);
        }
        Some(selection)
    }
}
