//! Domain specializations for prompt composition.
//!
//! A domain contributes extra instructions appended to the base prompts.
//! Unknown or "general" domains get no suffix.

#[derive(Debug, Clone)]
pub struct DomainConfig {
    pub name: &'static str,
    pub description: &'static str,
    pub concept_categories: &'static [&'static str],
    pub priority_sources: &'static [&'static str],
    pub extra_intent_instructions: &'static str,
}

const MATERIALS_SCIENCE: DomainConfig = DomainConfig {
    name: "materials_science",
    description: "Materials science and engineering",
    concept_categories: &[
        "Material System (composition, crystal structure, morphology)",
        "Processing (synthesis, heat treatment, deposition, sintering)",
        "Structure (grain size, texture, defects, interfaces, porosity)",
        "Properties (mechanical, electrical, thermal, magnetic, optical)",
        "Mechanism/Model (phase transformation, diffusion, DFT, MD, CALPHAD)",
        "Application/Constraints (service environment, cost, scalability)",
    ],
    priority_sources: &["semantic_scholar", "scopus", "web_of_science"],
    extra_intent_instructions: "\
When analyzing materials science queries, also identify:
- Specific material families (oxides, sulfides, polymers, composites, coatings)
- Test standards (ASTM, ISO, IEC) if applicable
- Computational methods (DFT, MD, CALPHAD, phase-field) if applicable
- Whether the query implies structural/crystallographic data needs (ICSD, COD, Materials Project)
- Whether the query implies phase diagram or thermodynamic data needs
",
};

/// Look up a domain by name. Returns `None` for general/unknown domains.
pub fn get_domain_config(domain: &str) -> Option<&'static DomainConfig> {
    match domain {
        "materials_science" => Some(&MATERIALS_SCIENCE),
        _ => None,
    }
}

/// Base prompt plus the domain suffix, when one exists.
pub fn compose_prompt(base: &str, domain: &str) -> String {
    match get_domain_config(domain) {
        Some(cfg) => format!("{base}\n\n{}", cfg.extra_intent_instructions),
        None => base.to_string(),
    }
}
