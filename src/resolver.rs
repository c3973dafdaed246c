//! Entity resolution: free-text names and aliases → canonical slugs.
//!
//! Riders, races, and teams are all addressed by ProCyclingStats slugs.
//! Resolution is a pure function of the normalized input text and the
//! static alias tables — never network-dependent — and it never fails:
//! text that matches no alias gets a best-effort derived slug instead.

use serde::Serialize;
use std::collections::HashMap;

use crate::slug::{fold_ascii, name_to_slug, slug_to_name};

/// Which alias table a lookup goes against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityDomain {
    Rider,
    Race,
    Team,
}

/// Common rider nicknames and short forms.
const RIDER_ALIASES: &[(&str, &str)] = &[
    ("pogacar", "tadej-pogacar"),
    ("pogi", "tadej-pogacar"),
    ("vingegaard", "jonas-vingegaard"),
    ("jonas", "jonas-vingegaard"),
    ("evenepoel", "remco-evenepoel"),
    ("remco", "remco-evenepoel"),
    ("wva", "wout-van-aert"),
    ("van aert", "wout-van-aert"),
    ("mvdp", "mathieu-van-der-poel"),
    ("van der poel", "mathieu-van-der-poel"),
    ("roglic", "primoz-roglic"),
    ("ganna", "filippo-ganna"),
    ("cavendish", "mark-cavendish"),
    ("cav", "mark-cavendish"),
    ("alaphilippe", "julian-alaphilippe"),
    ("ala", "julian-alaphilippe"),
    ("pidcock", "tom-pidcock"),
    ("bernal", "egan-bernal"),
    ("kuss", "sepp-kuss"),
    ("yates", "adam-yates"),
    ("mas", "enric-mas"),
    ("ciccone", "giulio-ciccone"),
    ("bardet", "romain-bardet"),
    ("nibali", "vincenzo-nibali"),
    ("valverde", "alejandro-valverde"),
    ("sagan", "peter-sagan"),
    ("viviani", "elia-viviani"),
    ("philipsen", "jasper-philipsen"),
    ("merlier", "tim-merlier"),
    ("girmay", "biniam-girmay"),
];

/// Common race names, nicknames, and translations.
const RACE_ALIASES: &[(&str, &str)] = &[
    ("tour", "tour-de-france"),
    ("tdf", "tour-de-france"),
    ("tour de france", "tour-de-france"),
    ("giro", "giro-d-italia"),
    ("giro d'italia", "giro-d-italia"),
    ("giro italia", "giro-d-italia"),
    ("vuelta", "vuelta-a-espana"),
    ("vuelta a espana", "vuelta-a-espana"),
    ("roubaix", "paris-roubaix"),
    ("paris-roubaix", "paris-roubaix"),
    ("fiandre", "tour-of-flanders"),
    ("ronde", "tour-of-flanders"),
    ("tour of flanders", "tour-of-flanders"),
    ("flanders", "tour-of-flanders"),
    ("sanremo", "milano-sanremo"),
    ("milan-sanremo", "milano-sanremo"),
    ("milano sanremo", "milano-sanremo"),
    ("lombardia", "giro-di-lombardia"),
    ("il lombardia", "giro-di-lombardia"),
    ("liegi", "liege-bastogne-liege"),
    ("liege", "liege-bastogne-liege"),
    ("freccia vallone", "la-fleche-wallonne"),
    ("fleche wallonne", "la-fleche-wallonne"),
    ("strade bianche", "strade-bianche"),
    ("tirreno", "tirreno-adriatico"),
    ("tirreno adriatico", "tirreno-adriatico"),
    ("uae tour", "uae-tour"),
    ("amstel", "amstel-gold-race"),
    ("amstel gold", "amstel-gold-race"),
    ("dauphine", "dauphine"),
    ("criterium dauphine", "dauphine"),
    ("suisse", "tour-de-suisse"),
    ("tour de suisse", "tour-de-suisse"),
    ("romandie", "tour-de-romandie"),
    ("tour de romandie", "tour-de-romandie"),
    ("basque", "itzulia-basque-country"),
    ("pais vasco", "itzulia-basque-country"),
    ("itzulia", "itzulia-basque-country"),
    ("catalunya", "volta-a-catalunya"),
    ("volta catalunya", "volta-a-catalunya"),
    ("worlds", "world-championship"),
    ("world championship", "world-championship"),
    ("worlds rr", "world-championship"),
];

/// Sponsor-era team names and abbreviations.
const TEAM_ALIASES: &[(&str, &str)] = &[
    ("uae", "uae-team-emirates"),
    ("uae emirates", "uae-team-emirates"),
    ("visma", "team-visma-lease-a-bike"),
    ("jumbo", "team-visma-lease-a-bike"),
    ("jumbo visma", "team-visma-lease-a-bike"),
    ("ineos", "ineos-grenadiers"),
    ("sky", "ineos-grenadiers"),
    ("quick step", "soudal-quick-step"),
    ("quickstep", "soudal-quick-step"),
    ("soudal", "soudal-quick-step"),
    ("deceuninck", "soudal-quick-step"),
    ("bora", "red-bull-bora-hansgrohe"),
    ("red bull", "red-bull-bora-hansgrohe"),
    ("red bull bora", "red-bull-bora-hansgrohe"),
    ("lidl trek", "lidl-trek"),
    ("trek", "lidl-trek"),
    ("alpecin", "alpecin-deceuninck"),
    ("alpecin deceuninck", "alpecin-deceuninck"),
    ("ef", "ef-education-easypost"),
    ("ef education", "ef-education-easypost"),
    ("education first", "ef-education-easypost"),
    ("bahrain", "bahrain-victorious"),
    ("bahrain victorious", "bahrain-victorious"),
    ("movistar", "movistar-team"),
    ("jayco", "team-jayco-alula"),
    ("jayco alula", "team-jayco-alula"),
    ("cofidis", "cofidis"),
    ("astana", "astana-qazaqstan-team"),
    ("intermarche", "intermarche-wanty"),
    ("lotto", "lotto-dstny"),
    ("lotto dstny", "lotto-dstny"),
    ("dsm", "team-dsm-firmenich-postnl"),
    ("groupama", "groupama-fdj"),
    ("fdj", "groupama-fdj"),
    ("ag2r", "decathlon-ag2r-la-mondiale-team"),
    ("arkea", "arkea-b-b-hotels"),
    ("uno-x", "uno-x-mobility"),
];

/// A rider search hit.
#[derive(Debug, Clone, Serialize)]
pub struct SearchMatch {
    pub name: String,
    pub slug: String,
    pub match_type: &'static str,
}

/// Resolves entity names to ProCyclingStats slugs.
///
/// Alias lookup is O(1) exact match on normalized text; there is no fuzzy
/// matching. Construct once and share — the tables are immutable.
#[derive(Debug)]
pub struct EntityResolver {
    riders: HashMap<&'static str, &'static str>,
    races: HashMap<&'static str, &'static str>,
    teams: HashMap<&'static str, &'static str>,
}

impl Default for EntityResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityResolver {
    pub fn new() -> Self {
        Self {
            riders: RIDER_ALIASES.iter().copied().collect(),
            races: RACE_ALIASES.iter().copied().collect(),
            teams: TEAM_ALIASES.iter().copied().collect(),
        }
    }

    /// Resolves free text to a slug for the given domain.
    ///
    /// Exact alias hit on the normalized text wins; otherwise a slug is
    /// derived from the original text. Never fails — degenerate input
    /// yields an empty slug.
    pub fn resolve(&self, domain: EntityDomain, text: &str) -> String {
        let table = match domain {
            EntityDomain::Rider => &self.riders,
            EntityDomain::Race => &self.races,
            EntityDomain::Team => &self.teams,
        };
        let normalized = normalize(text);
        if let Some(slug) = table.get(normalized.as_str()) {
            return (*slug).to_string();
        }
        name_to_slug(text)
    }

    /// Searches the rider alias table by substring containment in either
    /// direction. Results follow table iteration order and are tagged
    /// `match_type = "alias"`.
    pub fn search(&self, query: &str) -> Vec<SearchMatch> {
        let normalized = normalize(query);
        RIDER_ALIASES
            .iter()
            .filter(|(alias, _)| normalized.contains(alias) || alias.contains(&normalized))
            .map(|(_, slug)| SearchMatch {
                name: slug_to_name(slug),
                slug: (*slug).to_string(),
                match_type: "alias",
            })
            .collect()
    }
}

/// Normalizes text for alias matching: ASCII fold, lowercase, trim,
/// collapse internal whitespace to single spaces.
fn normalize(text: &str) -> String {
    fold_ascii(&text.to_lowercase())
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
