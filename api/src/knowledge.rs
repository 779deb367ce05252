//! Read-only catalog of bureaucratic procedures with fuzzy text lookup.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Minimum per-token similarity for a token to count as a match
const TOKEN_MATCH_MIN: f64 = 0.88;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct KnowledgeEntry {
    pub id: String,
    pub title: String,
    pub authority: String,
    pub category: String,
    pub summary: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct KnowledgeMatch {
    #[serde(flatten)]
    pub entry: KnowledgeEntry,
    pub score: f64,
}

pub struct KnowledgeBase {
    entries: Vec<KnowledgeEntry>,
}

impl KnowledgeBase {
    pub fn new(entries: Vec<KnowledgeEntry>) -> Self {
        Self { entries }
    }

    pub fn builtin() -> Self {
        Self::new(builtin_entries())
    }

    pub fn all(&self) -> &[KnowledgeEntry] {
        &self.entries
    }

    /// Best matches for `query`, highest score first, at most `limit` of them.
    pub fn search(&self, query: &str, limit: usize) -> Vec<KnowledgeMatch> {
        let terms = tokenize(query);
        if terms.is_empty() {
            return Vec::new();
        }

        let mut matches: Vec<KnowledgeMatch> = self
            .entries
            .iter()
            .filter_map(|entry| {
                let score = score_entry(entry, &terms);
                (score > 0.0).then(|| KnowledgeMatch {
                    entry: entry.clone(),
                    score,
                })
            })
            .collect();

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.entry.id.cmp(&b.entry.id))
        });
        matches.truncate(limit);
        matches
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 2)
        .map(str::to_lowercase)
        .collect()
}

/// Share of query terms that fuzzily hit the entry, weighted by hit quality.
/// Title hits count double.
fn score_entry(entry: &KnowledgeEntry, terms: &[String]) -> f64 {
    let title = tokenize(&entry.title);
    let body: Vec<String> = tokenize(&entry.summary)
        .into_iter()
        .chain(entry.keywords.iter().flat_map(|k| tokenize(k)))
        .chain(tokenize(&entry.category))
        .collect();

    let mut total = 0.0;
    for term in terms {
        let title_hit = best_similarity(term, &title);
        let body_hit = best_similarity(term, &body);
        if title_hit >= TOKEN_MATCH_MIN {
            total += 2.0 * title_hit;
        } else if body_hit >= TOKEN_MATCH_MIN {
            total += body_hit;
        }
    }
    let score = total / (2.0 * terms.len() as f64);
    (score * 1000.0).round() / 1000.0
}

fn best_similarity(term: &str, tokens: &[String]) -> f64 {
    tokens
        .iter()
        .map(|t| strsim::jaro_winkler(term, t))
        .fold(0.0, f64::max)
}

fn entry(
    id: &str,
    title: &str,
    authority: &str,
    category: &str,
    summary: &str,
    keywords: &[&str],
) -> KnowledgeEntry {
    KnowledgeEntry {
        id: id.to_string(),
        title: title.to_string(),
        authority: authority.to_string(),
        category: category.to_string(),
        summary: summary.to_string(),
        keywords: keywords.iter().map(|k| (*k).to_string()).collect(),
    }
}

fn builtin_entries() -> Vec<KnowledgeEntry> {
    vec![
        entry(
            "gewerbeanmeldung",
            "Trade registration (Gewerbeanmeldung)",
            "Gewerbeamt",
            "business",
            "Mandatory registration before starting any commercial activity.",
            &["business", "trade", "startup", "self-employed"],
        ),
        entry(
            "gaststaettenerlaubnis",
            "Restaurant licence (Gaststättenerlaubnis)",
            "Ordnungsamt",
            "food",
            "Needed when alcoholic drinks are served on the premises.",
            &["restaurant", "bar", "alcohol", "cafe", "gastronomy"],
        ),
        entry(
            "ifsg-belehrung",
            "Food hygiene instruction (IfSG §43)",
            "Gesundheitsamt",
            "food",
            "Health office instruction required for everyone handling open food.",
            &["hygiene", "health", "kitchen", "food handling"],
        ),
        entry(
            "sondernutzung",
            "Street-use permit (Sondernutzungserlaubnis)",
            "Straßen- und Grünflächenamt",
            "public space",
            "Permit for using pavements or squares, e.g. outdoor seating or signage.",
            &["terrace", "outdoor", "seating", "pavement", "sidewalk"],
        ),
        entry(
            "steuerliche-erfassung",
            "Tax registration questionnaire",
            "Finanzamt",
            "tax",
            "Register with the tax office within a month of starting a business \
             to receive a tax number.",
            &["tax", "elster", "vat", "tax number"],
        ),
        entry(
            "anmeldung-wohnsitz",
            "Residence registration (Anmeldung)",
            "Bürgeramt",
            "residence",
            "Register a new address within two weeks of moving in.",
            &["address", "moving", "apartment", "registration certificate"],
        ),
        entry(
            "aufenthaltstitel",
            "Residence permit",
            "Landesamt für Einwanderung",
            "immigration",
            "Permit for non-EU citizens to live and work; \
             self-employment needs a separate approval.",
            &["visa", "immigration", "work permit", "blue card"],
        ),
        entry(
            "baugenehmigung",
            "Building permit (Baugenehmigung)",
            "Bauaufsicht",
            "construction",
            "Required for new buildings, extensions and changes of use of premises.",
            &["construction", "renovation", "change of use", "architect"],
        ),
        entry(
            "hundesteuer",
            "Dog tax registration",
            "Finanzamt",
            "tax",
            "Dog owners must register their dog for the annual dog tax.",
            &["dog", "pet", "animal"],
        ),
        entry(
            "fuehrerschein-umschreibung",
            "Foreign driving licence conversion",
            "Fahrerlaubnisbehörde",
            "transport",
            "Convert a non-EU driving licence within six months of residence.",
            &["driving", "licence", "car", "transport"],
        ),
    ]
}
