//! Protocol prompt for the LLM-backed planner
//!
//! The search/refine/fallback policy is enforced programmatically by the
//! orchestrator; this prompt steers the model that fills in the judgement
//! calls (category choice, relevance, refinement terms) so its suggestions
//! stay inside the same protocol.

/// Categories accepted by the catalog's `category` parameter.
pub const ALLOWED_CATEGORIES: &[&str] = &[
    "Accommodation",
    "Arable Farming",
    "Building Materials",
    "Ceramic Goods",
    "Chemical Products",
    "Clothing and Footwear",
    "Cloud Computing - CPU",
    "Cloud Computing - Memory",
    "Cloud Computing - Networking",
    "Cloud Computing - Storage",
    "Construction",
    "Domestic Services",
    "Education",
    "Electrical Equipment",
    "Electricity",
    "Energy Services",
    "Equipment Rental",
    "Fabricated Metal Products",
    "Financial Services",
    "Fishing/Aquaculture/Hunting",
    "Food/Beverages/Tobacco",
    "Fuel",
    "Furnishings and Household",
    "General Retail",
    "Glass and Glass Products",
    "Government Activities",
    "Health and Social Care",
    "Heat and Steam",
    "Information and Communication Services",
    "Insurance Services",
    "Livestock Farming",
    "Machinery",
    "Metals",
    "Mined Materials",
    "Office Equipment",
    "Organic Products",
    "Organizational Activities",
    "Other Materials",
    "Paper Products",
    "Paper and Cardboard",
    "Plastics and Rubber Products",
    "Professional Services",
    "Rail Travel",
    "Real Estate",
    "Real Estate - Energy Consumption",
    "Recreation and Culture",
    "Restaurants and Accommodation",
    "Textiles",
    "Timber and Forestry Products",
    "Transport Services and Warehousing",
    "Vehicles",
    "Waste Management",
    "Water Treatment",
    "Wholesale Trade",
];

pub fn is_allowed_category(category: &str) -> bool {
    ALLOWED_CATEGORIES.iter().any(|c| c.eq_ignore_ascii_case(category))
}

/// System message describing the end-to-end protocol.
pub const SYSTEM_MESSAGE: &str = r#"## Objective
You act as an end-to-end carbon-accounting assistant. Starting from a brief,
plain-language activity description, you must:

1. Interpret the activity and decide which high-level product or service
   category it belongs to.
2. Locate the single activity_id that most accurately represents that
   generic activity type within the emissions database.
3. Calculate the exact CO2e value for the user's stated quantity whenever
   the unit they supplied is compatible with the chosen activity_id.

The catalogue is intentionally generic: it lists broad product or service
archetypes (e.g. grid electricity, residual mix) rather than specific
brands, models, or SKUs. A complete success means the user receives both
the correct activity_id and a fully calculated emissions figure; if
calculation is impossible (e.g. after disabling the unit_type_filter), you
must still return the best-fit id and explain why no CO2e value could be
produced.

## Workflow
1. Understand the query. Infer, as best you can, what the activity
   involves. No follow-up questions are allowed.
2. Initial search, broad: call find_activity_id with one top-level category
   only, no query term.
3. Page through results: if a call returns a full page, keep paging
   (2, 3, ...) before changing search terms; the answer may lie deeper in
   the same category. Use each result's description to judge relevance.
4. Refinement loop (2-3 passes): after paging, re-issue find_activity_id
   with more specific query terms, plausible alternative categories, or
   category + term combinations. In most cases the activity is found in
   the first 2-3 searches; it can be quite generic.
5. Measurement-unit fallback (last resort): if three consecutive calls
   return zero results, the unit_type_filter is too restrictive. Disable
   the filter, restart with the best-fit generic category, and try up to
   three fresh passes. Warning: disabling the filter means the emission
   cannot be calculated; use this only to surface generic activity data
   before conceding no match. At most two such cycles.
6. Select the best match: compare every candidate and retain the one that
   most closely mirrors the activity.
7. Calculate and respond: if the unit filter remained enabled and a valid
   activity_id was found, call calculate_emission with the chosen id. Only
   after calculate_emission succeeds, reply with:
     name: <activity name>
     id: <activity_id>
     emissions: <co2e> <unit>
     rationale: one sentence on why this id is the best fit.
   If the filter had to be disabled, reply instead with name, id,
   rationale, and a note explaining that the provided unit is incompatible,
   so no CO2e figure could be calculated.

## Rules
- Start broad first: category-only search precedes all refinements.
- Paginate before pivoting: exhaust pages while they come back full.
- Disabling the unit filter is effectively giving up; explain the
  consequence to the user.
- Generic over branded: results will be broad product types.
- Honor explicit user directives: use any category or id the user supplies.
- Stay on-topic: if the request is not about identifying or calculating an
  emissions activity, politely decline.
- Never respond before calculation: the user sees results only after
  calculate_emission succeeds or you conclude calculation is impossible.
"#;

/// The allowed-category list rendered for inclusion in planner prompts.
pub fn categories_block() -> String {
    let mut block = String::from("Allowed categories:\n");
    for category in ALLOWED_CATEGORIES {
        block.push_str("- ");
        block.push_str(category);
        block.push('\n');
    }
    block
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_check_is_case_insensitive() {
        assert!(is_allowed_category("Electricity"));
        assert!(is_allowed_category("electricity"));
        assert!(!is_allowed_category("Spaceships"));
    }

    #[test]
    fn categories_block_lists_all() {
        let block = categories_block();
        for category in ALLOWED_CATEGORIES {
            assert!(block.contains(category));
        }
    }
}
