use tracing::trace;

use crate::domain::{AuthorId, Authorship, InstitutionRef};
use crate::rules::{AliasRule, OverrideTable};

/// Which tier of the attribution policy produced a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributionTier {
    Override,
    Alias,
    Institution,
    AuthorBucket,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitAttribution {
    pub unit_id: String,
    pub unit_name: String,
    pub raw_affiliation: Option<String>,
    pub institution_ror: Option<String>,
    pub tier: AttributionTier,
}

/// Deepest institution on an authorship, by longest display name.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Candidate {
    id: Option<String>,
    name: Option<String>,
}

/// Tiered unit attribution: override, then alias rule, then institution, then author bucket.
#[derive(Debug, Clone, Default)]
pub struct UnitResolver {
    aliases: Vec<AliasRule>,
    overrides: OverrideTable,
}

impl UnitResolver {
    /// `aliases` must already be in evaluation order.
    pub fn new(aliases: Vec<AliasRule>, overrides: OverrideTable) -> Self {
        Self { aliases, overrides }
    }

    pub fn alias_count(&self) -> usize {
        self.aliases.len()
    }

    pub fn override_count(&self) -> usize {
        self.overrides.len()
    }

    pub fn resolve(&self, author: &AuthorId, authorship: Option<&Authorship>) -> UnitAttribution {
        let raw_affiliation = authorship.and_then(Authorship::raw_affiliation);
        let attribution = self.resolve_tiers(author, authorship, raw_affiliation);
        trace!(
            author = %author,
            tier = ?attribution.tier,
            unit = %attribution.unit_id,
            "resolved unit"
        );
        attribution
    }

    fn resolve_tiers(
        &self,
        author: &AuthorId,
        authorship: Option<&Authorship>,
        raw_affiliation: Option<String>,
    ) -> UnitAttribution {
        if let Some(rule) = self.overrides.get(author.as_str()) {
            return UnitAttribution {
                unit_id: non_blank(&rule.unit_id).unwrap_or_else(|| bucket_id(author)),
                unit_name: non_blank(&rule.unit_name).unwrap_or_else(|| bucket_name(author)),
                raw_affiliation,
                institution_ror: None,
                tier: AttributionTier::Override,
            };
        }

        let candidate = authorship.and_then(|a| deepest_institution(a.institutions()));
        let candidate_id = candidate.as_ref().and_then(|c| c.id.clone());
        let candidate_name = candidate.as_ref().and_then(|c| c.name.clone());

        let subject = [raw_affiliation.as_deref(), candidate_name.as_deref()]
            .into_iter()
            .map(|part| part.unwrap_or(""))
            .collect::<Vec<_>>()
            .join(" ");
        let subject = subject.trim();
        if !subject.is_empty() {
            if let Some(rule) = self.aliases.iter().find(|rule| rule.is_match(subject)) {
                return UnitAttribution {
                    unit_id: non_blank(&rule.unit_id)
                        .or_else(|| candidate_id.clone())
                        .unwrap_or_else(|| bucket_id(author)),
                    unit_name: non_blank(&rule.unit_name)
                        .or_else(|| candidate_name.clone())
                        .unwrap_or_else(|| bucket_name(author)),
                    raw_affiliation,
                    institution_ror: candidate_id,
                    tier: AttributionTier::Alias,
                };
            }
        }

        if let Some(id) = candidate_id {
            return UnitAttribution {
                unit_id: id.clone(),
                unit_name: candidate_name.unwrap_or_else(|| id.clone()),
                raw_affiliation,
                institution_ror: Some(id),
                tier: AttributionTier::Institution,
            };
        }

        UnitAttribution {
            unit_id: bucket_id(author),
            unit_name: bucket_name(author),
            raw_affiliation,
            institution_ror: None,
            tier: AttributionTier::AuthorBucket,
        }
    }
}

/// Longest display name wins; the first of equal length is kept.
fn deepest_institution(institutions: &[InstitutionRef]) -> Option<Candidate> {
    let mut best: Option<(usize, &InstitutionRef)> = None;
    for institution in institutions {
        let score = institution
            .display_name
            .as_deref()
            .map(|name| name.chars().count())
            .unwrap_or(0);
        if best.is_none_or(|(top, _)| score > top) {
            best = Some((score, institution));
        }
    }
    best.map(|(_, institution)| {
        let id = institution
            .ror
            .as_deref()
            .and_then(non_blank)
            .or_else(|| institution.id.as_deref().and_then(non_blank));
        let name = institution
            .display_name
            .as_deref()
            .and_then(non_blank)
            .or_else(|| id.clone());
        Candidate { id, name }
    })
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn bucket_id(author: &AuthorId) -> String {
    format!("author:{author}")
}

fn bucket_name(author: &AuthorId) -> String {
    format!("Author {author}")
}
