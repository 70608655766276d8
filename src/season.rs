use serde::{Deserialize, Serialize};

use crate::grouping::LocalClock;
use crate::models::ModelError;

/// When a recurring activity can be done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Season {
    YearRound,
    /// Inclusive month range. `start > end` wraps across the new year.
    Window { start: u32, end: u32 },
}

impl Season {
    pub fn window(start: u32, end: u32) -> Result<Self, ModelError> {
        for month in [start, end] {
            if !(1..=12).contains(&month) {
                return Err(ModelError::InvalidMonth(month));
            }
        }
        Ok(Season::Window { start, end })
    }

    /// Builds a season from the catalog encoding where `(0, 0)` means all year.
    pub fn from_raw(start: u32, end: u32) -> Result<Self, ModelError> {
        match (start, end) {
            (0, 0) => Ok(Season::YearRound),
            (0, _) | (_, 0) => Err(ModelError::InvalidSeason { start, end }),
            _ => Season::window(start, end),
        }
    }

    pub fn contains(&self, month: u32) -> bool {
        match *self {
            Season::YearRound => true,
            Season::Window { start, end } if start <= end => start <= month && month <= end,
            Season::Window { start, end } => month >= start || month <= end,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelessActivity {
    pub id: String,
    pub title: String,
    pub subtitle: String,
    pub description: String,
    pub location: String,
    pub season: Season,
    pub season_label: String,
    pub url: Option<String>,
}

pub fn is_in_season(activity: &TimelessActivity, month: u32) -> bool {
    activity.season.contains(month)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SeasonPartition {
    pub in_season: Vec<TimelessActivity>,
    pub off_season: Vec<TimelessActivity>,
}

pub fn partition_by_month(catalog: &[TimelessActivity], month: u32) -> SeasonPartition {
    let (in_season, off_season) = catalog
        .iter()
        .cloned()
        .partition(|activity| is_in_season(activity, month));
    SeasonPartition {
        in_season,
        off_season,
    }
}

pub fn partition_by_current_season(
    catalog: &[TimelessActivity],
    clock: &LocalClock,
) -> SeasonPartition {
    partition_by_month(catalog, clock.month())
}

fn activity(
    id: &str,
    title: &str,
    subtitle: &str,
    description: &str,
    location: &str,
    season: Season,
    season_label: &str,
    url: Option<&str>,
) -> TimelessActivity {
    TimelessActivity {
        id: id.to_string(),
        title: title.to_string(),
        subtitle: subtitle.to_string(),
        description: description.to_string(),
        location: location.to_string(),
        season,
        season_label: season_label.to_string(),
        url: url.map(str::to_string),
    }
}

/// Permanent and seasonal activities around the Côte d'Azur.
pub fn default_catalog() -> Vec<TimelessActivity> {
    let window = |start, end| Season::Window { start, end };
    vec![
        activity(
            "ski",
            "Ski alpin",
            "Auron & Isola 2000",
            "Les stations de ski de l'arriere-pays nicois, a 1h30 de la mer.",
            "Arriere-pays nicois",
            window(12, 3),
            "Mi-dec a fin mars",
            Some("https://www.isola2000.com"),
        ),
        activity(
            "plages",
            "Plages & baignade",
            "Cannes, Antibes, Nice",
            "Les plus belles plages de la Cote d'Azur, de la Croisette a la Promenade des Anglais.",
            "Cote d'Azur",
            window(6, 9),
            "Juin a septembre",
            None,
        ),
        activity(
            "mercantour",
            "Randonnee Mercantour",
            "Parc national du Mercantour",
            "Sentiers alpins, lacs d'altitude et la Vallee des Merveilles a 2h de Nice.",
            "Parc du Mercantour",
            window(5, 10),
            "Mai a octobre",
            Some("https://www.mercantour-parcnational.fr"),
        ),
        activity(
            "nautique",
            "Sports nautiques",
            "Jet-ski, paddle, voile",
            "Jet-ski, paddle, plongee et voile le long de la Cote d'Azur.",
            "Cote d'Azur",
            window(5, 9),
            "Mai a septembre",
            None,
        ),
        activity(
            "lerins",
            "Iles de Lerins",
            "Sainte-Marguerite & Saint-Honorat",
            "Escapade sur les iles au large de Cannes : nature, patrimoine et eaux turquoise.",
            "Cannes",
            window(4, 10),
            "Avril a octobre",
            Some("https://www.lerinsleroyal.com"),
        ),
        activity(
            "napoleon",
            "Route Napoleon",
            "Grasse \u{2192} Grenoble",
            "325 km de route historique a travers les Alpes, depart depuis Grasse.",
            "Grasse \u{2192} Grenoble",
            Season::YearRound,
            "Toute l'annee",
            None,
        ),
        activity(
            "forville",
            "Marche Forville",
            "Cannes",
            "Marche provencal couvert : fruits, legumes, poissons frais et fleurs tous les matins.",
            "Cannes",
            Season::YearRound,
            "Toute l'annee",
            None,
        ),
        activity(
            "golf",
            "Golf",
            "Mougins, Mandelieu",
            "Parcours de golf prestigieux entre mer et montagne, jouables toute l'annee.",
            "Mougins, Mandelieu",
            Season::YearRound,
            "Toute l'annee",
            None,
        ),
    ]
}
