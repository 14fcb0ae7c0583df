use serde::{Deserialize, Serialize};

pub const PLAYER_DOC_TYPE: &str = "Player";

const BARCELONA: &str = "FC Barcelona";
const MAN_CITY: &str = "Manchester City";

/// A registered player. `doc_type` lets predicate queries tell players apart
/// from other documents sharing the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    #[serde(rename = "docType")]
    pub doc_type: String,
    pub name: String,
    pub club: String,
    pub country: String,
    pub kit_no: u32,
}

impl Player {
    pub fn new(
        name: impl Into<String>,
        club: impl Into<String>,
        country: impl Into<String>,
        kit_no: u32,
    ) -> Self {
        Self {
            doc_type: PLAYER_DOC_TYPE.to_string(),
            name: name.into(),
            club: club.into(),
            country: country.into(),
            kit_no,
        }
    }
}

const DEFAULT_ROSTER: &[(&str, &str, &str, u32)] = &[
    ("Marc Andre Ter Stegen", BARCELONA, "Germany", 1),
    ("Nelson Semedo", BARCELONA, "Portugal", 2),
    ("Gerard Pique", BARCELONA, "Spain", 3),
    ("Ivan Rakitic", BARCELONA, "Croatia", 4),
    ("Sergio Busquets", BARCELONA, "Spain", 5),
    ("Denis Suarez", BARCELONA, "Spain", 6),
    ("Philippe Coutinho", BARCELONA, "Brazil", 7),
    ("Arthur Melo", BARCELONA, "Brazil", 8),
    ("Luis Suarez", BARCELONA, "Uruguay", 9),
    ("Lionel Messi", BARCELONA, "Argentina", 10),
    ("Ousmane Dembele", BARCELONA, "France", 11),
    ("Rafinha Alcantara", BARCELONA, "Brazil", 12),
    ("Jasper Cillessen", BARCELONA, "Netherlands", 13),
    ("Malcom", BARCELONA, "Brazil", 14),
    ("Clement Lenglet", BARCELONA, "France", 15),
    ("Paco Alcacer", BARCELONA, "Spain", 17),
    ("Jordi Alba", BARCELONA, "Spain", 18),
    ("Munir Al Haddadi", BARCELONA, "Spain", 19),
    ("Sergio Roberto", BARCELONA, "Spain", 20),
    ("Arturo Vidal", BARCELONA, "Chile", 22),
    ("Samuel Umtiti", BARCELONA, "France", 23),
    ("Thomas Vermaelen", BARCELONA, "Belgium", 25),
    ("Claudio Bravo", MAN_CITY, "Chile", 1),
    ("Kyle Walker", MAN_CITY, "England", 2),
    ("Danilo", MAN_CITY, "Brazil", 3),
    ("Vincent Kompany", MAN_CITY, "Belgium", 4),
    ("John Stones", MAN_CITY, "England", 5),
    ("Raheem Sterling", MAN_CITY, "England", 7),
    ("Ilkay Gundogan", MAN_CITY, "Germany", 8),
    ("Sergio Aguero", MAN_CITY, "Argentina", 10),
    ("Aymeric Laporte", MAN_CITY, "France", 14),
    ("Eliaquim Mangala", MAN_CITY, "France", 15),
    ("Kevin De Bruyne", MAN_CITY, "Belgium", 17),
    ("Fabian Delph", MAN_CITY, "England", 18),
    ("Leroy Sane", MAN_CITY, "Germany", 19),
    ("Bernardo Silva", MAN_CITY, "Portugal", 20),
    ("David Silva", MAN_CITY, "Spain", 21),
    ("Benjamin Mendy", MAN_CITY, "France", 22),
    ("Fernandinho", MAN_CITY, "Brazil", 25),
    ("Riyad Mahrez", MAN_CITY, "Algeria", 26),
    ("Nicolas Otamendi", MAN_CITY, "Argentina", 30),
    ("Ederson", MAN_CITY, "Brazil", 31),
    ("Gabriel Jesus", MAN_CITY, "Brazil", 33),
];

/// Squad lists seeded by `initLedger`, in key order.
pub fn default_roster() -> Vec<Player> {
    DEFAULT_ROSTER
        .iter()
        .map(|(name, club, country, kit_no)| Player::new(*name, *club, *country, *kit_no))
        .collect()
}
