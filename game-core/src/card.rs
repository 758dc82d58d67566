use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DECK_SIZE: usize = 54;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Suit {
    Spade,
    Heart,
    Club,
    Diamond,
    Joker,
}

impl Suit {
    pub const STANDARD: [Suit; 4] = [Suit::Spade, Suit::Heart, Suit::Club, Suit::Diamond];

    fn order(&self) -> u8 {
        match self {
            Suit::Diamond => 1,
            Suit::Club => 2,
            Suit::Heart => 3,
            Suit::Spade => 4,
            Suit::Joker => 5,
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            Suit::Spade => "♠",
            Suit::Heart => "♥",
            Suit::Club => "♣",
            Suit::Diamond => "♦",
            Suit::Joker => "",
        }
    }
}

/// Card rank. The discriminant is the comparison weight.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub enum Rank {
    Three = 3,
    Four = 4,
    Five = 5,
    Six = 6,
    Seven = 7,
    Eight = 8,
    Nine = 9,
    Ten = 10,
    Jack = 11,
    Queen = 12,
    King = 13,
    Ace = 14,
    Two = 15,
    SmallJoker = 16,
    BigJoker = 17,
}

impl Rank {
    /// The thirteen ranks that come in four suits.
    pub const STANDARD: [Rank; 13] = [
        Rank::Three,
        Rank::Four,
        Rank::Five,
        Rank::Six,
        Rank::Seven,
        Rank::Eight,
        Rank::Nine,
        Rank::Ten,
        Rank::Jack,
        Rank::Queen,
        Rank::King,
        Rank::Ace,
        Rank::Two,
    ];

    pub fn weight(&self) -> u8 {
        *self as u8
    }

    pub fn is_joker(&self) -> bool {
        matches!(self, Rank::SmallJoker | Rank::BigJoker)
    }

    /// Twos and jokers never take part in straights, pair straights or planes.
    pub fn is_sequenceable(&self) -> bool {
        self.weight() < Rank::Two.weight()
    }

    pub fn label(&self) -> &'static str {
        match self {
            Rank::Three => "3",
            Rank::Four => "4",
            Rank::Five => "5",
            Rank::Six => "6",
            Rank::Seven => "7",
            Rank::Eight => "8",
            Rank::Nine => "9",
            Rank::Ten => "10",
            Rank::Jack => "J",
            Rank::Queen => "Q",
            Rank::King => "K",
            Rank::Ace => "A",
            Rank::Two => "2",
            Rank::SmallJoker => "小王",
            Rank::BigJoker => "大王",
        }
    }

    fn from_char(ch: char) -> Option<Self> {
        match ch {
            '3' => Some(Rank::Three),
            '4' => Some(Rank::Four),
            '5' => Some(Rank::Five),
            '6' => Some(Rank::Six),
            '7' => Some(Rank::Seven),
            '8' => Some(Rank::Eight),
            '9' => Some(Rank::Nine),
            '0' => Some(Rank::Ten),
            'J' => Some(Rank::Jack),
            'Q' => Some(Rank::Queen),
            'K' => Some(Rank::King),
            'A' | '1' => Some(Rank::Ace),
            '2' => Some(Rank::Two),
            _ => None,
        }
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Scans selection shorthand such as `"33 44 55"`, `"10JQKA"` or `"小王大王"`
/// into the requested ranks, in input order.
///
/// The input is split on whitespace and each part is scanned on its own, with
/// letters case-insensitive. Within a part `10` is always read as Ten, so a `1`
/// is only an Ace when the next character of the same part is not `0`. Returns
/// `None` on the first unrecognised character.
pub fn parse_ranks(input: &str) -> Option<Vec<Rank>> {
    let mut ranks = Vec::with_capacity(input.len());
    for part in input.split_whitespace() {
        scan_part(part, &mut ranks)?;
    }
    Some(ranks)
}

fn scan_part(part: &str, ranks: &mut Vec<Rank>) -> Option<()> {
    let chars: Vec<char> = part.chars().map(|ch| ch.to_ascii_uppercase()).collect();
    let mut i = 0;
    while i < chars.len() {
        let next = chars.get(i + 1).copied();
        match (chars[i], next) {
            ('1', Some('0')) => {
                ranks.push(Rank::Ten);
                i += 2;
            }
            ('小', Some('王')) => {
                ranks.push(Rank::SmallJoker);
                i += 2;
            }
            ('大', Some('王')) => {
                ranks.push(Rank::BigJoker);
                i += 2;
            }
            (ch, _) => {
                ranks.push(Rank::from_char(ch)?);
                i += 1;
            }
        }
    }
    Some(())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Card {
    suit: Suit,
    rank: Rank,
}

impl Card {
    pub fn new(suit: Suit, rank: Rank) -> Self {
        Card { suit, rank }
    }

    pub fn joker(rank: Rank) -> Self {
        debug_assert!(rank.is_joker());
        Card {
            suit: Suit::Joker,
            rank,
        }
    }

    pub fn suit(&self) -> Suit {
        self.suit
    }

    pub fn rank(&self) -> Rank {
        self.rank
    }

    pub fn weight(&self) -> u8 {
        self.rank.weight()
    }

    /// Ordering key used for hand sorting: rank first, suit only as a tie-break.
    pub fn sort_key(&self) -> (Rank, u8) {
        (self.rank, self.suit.order())
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.suit.symbol(), self.rank.label())
    }
}

pub fn standard_deck() -> Vec<Card> {
    let mut deck = Vec::with_capacity(DECK_SIZE);
    for suit in Suit::STANDARD.iter() {
        for rank in Rank::STANDARD.iter() {
            deck.push(Card::new(*suit, *rank));
        }
    }
    deck.push(Card::joker(Rank::SmallJoker));
    deck.push(Card::joker(Rank::BigJoker));
    debug_assert_eq!(deck.len(), DECK_SIZE);
    deck
}

pub fn shuffled_deck<R: Rng + ?Sized>(rng: &mut R) -> Vec<Card> {
    let mut deck = standard_deck();
    deck.shuffle(rng);
    deck
}

/// Deals 17 cards to each seat round-robin and returns the hands with the
/// three bottom cards.
pub fn deal<R: Rng + ?Sized>(rng: &mut R) -> ([Vec<Card>; 3], Vec<Card>) {
    let mut deck = shuffled_deck(rng);
    let mut hands = [
        Vec::with_capacity(20),
        Vec::with_capacity(20),
        Vec::with_capacity(20),
    ];
    for (i, card) in deck.iter().take(51).enumerate() {
        hands[i % 3].push(*card);
    }
    let bottom = deck.split_off(51);
    debug_assert!(hands.iter().all(|hand| hand.len() == 17));
    debug_assert_eq!(bottom.len(), 3);
    (hands, bottom)
}

/// Sorts a hand strongest first.
pub fn sort_hand(hand: &mut [Card]) {
    hand.sort_by(|a, b| b.sort_key().cmp(&a.sort_key()));
}
