//! # Team Definitions
//!
//! Named DAG presets. Each team is a set of stage descriptors ending in a
//! synthesizer, one instruction line per role, and the fallback notice its
//! error artifacts carry.
//!
//! | Team                    | Shape                                              |
//! |-------------------------|----------------------------------------------------|
//! | `location-intelligence` | geographic → (epidemiological, resources) → risk → report |
//! | `clinical-decision`     | four independent stages → report                   |
//! | `homepage`              | crawl → strategy → six sections → composer         |

use serde_json::{json, Value};

use super::{LlmWorkerFactory, WorkerRegistry};
use crate::swarm::{
    resolve, ConfigError, FallbackNotice, Orchestrator, PipelineContext, Request,
    StageDescriptor,
};

/// One role and the system instructions given to its worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleSpec {
    pub role: &'static str,
    pub instructions: &'static str,
}

const fn role(role: &'static str, instructions: &'static str) -> RoleSpec {
    RoleSpec { role, instructions }
}

/// A named preset pipeline
#[derive(Debug, Clone)]
pub struct TeamDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub stages: Vec<StageDescriptor>,
    pub synthesizer: StageDescriptor,
    pub roles: Vec<RoleSpec>,
    pub fallback: FallbackNotice,
}

impl TeamDefinition {
    /// Build an orchestrator for this team over `registry`
    pub fn orchestrator(&self, registry: &WorkerRegistry) -> Result<Orchestrator, ConfigError> {
        Orchestrator::with_synthesizer(self.stages.clone(), self.synthesizer.clone(), registry)
    }

    /// One `LlmWorker` per role
    pub fn llm_registry(&self, factory: &LlmWorkerFactory) -> WorkerRegistry {
        factory.registry(self.roles.iter().map(|r| (r.role, r.instructions)))
    }

    pub fn instructions(&self, role: &str) -> Option<&'static str> {
        self.roles
            .iter()
            .find(|r| r.role == role)
            .map(|r| r.instructions)
    }

    /// Execution waves without building workers; the synthesizer runs alone last
    pub fn execution_waves(&self) -> Result<Vec<Vec<&str>>, ConfigError> {
        let plan = resolve(&self.stages)?;
        let mut waves: Vec<Vec<&str>> = plan
            .waves
            .iter()
            .map(|wave| {
                wave.iter()
                    .map(|&i| self.stages[i].stage_id.as_str())
                    .collect()
            })
            .collect();
        waves.push(vec![self.synthesizer.stage_id.as_str()]);
        Ok(waves)
    }

    /// Stage ids including the synthesizer, in declaration order
    pub fn stage_ids(&self) -> Vec<&str> {
        self.stages
            .iter()
            .chain(std::iter::once(&self.synthesizer))
            .map(|d| d.stage_id.as_str())
            .collect()
    }
}

/// Empty payload in the `StageReport` shape
pub fn report_placeholder() -> Value {
    json!({
        "title": null,
        "summary": "",
        "content": "",
        "findings": []
    })
}

fn stage(id: &str) -> StageDescriptor {
    StageDescriptor::new(id, id).placeholder(report_placeholder())
}

/// Location intelligence: a staged chain of public health analyses
pub fn location_intelligence_team() -> TeamDefinition {
    TeamDefinition {
        name: "location-intelligence",
        description: "Location-specific public health intelligence report",
        stages: vec![
            stage("geographic").project(location_prompt),
            stage("epidemiological").requires(["geographic"]),
            stage("resources").requires(["geographic"]),
            stage("risk").requires(["geographic", "epidemiological", "resources"]),
        ],
        synthesizer: stage("report"),
        roles: vec![
            role("geographic", "Identify the health jurisdiction, administrative boundaries and population profile of the location."),
            role("epidemiological", "Summarize current disease activity, outbreaks and seasonal risks for the location."),
            role("resources", "Map nearby hospitals, urgent care, pharmacies and public health offices."),
            role("risk", "Assess overall health risk for the location and list any alerts."),
            role("report", "Compose a location intelligence report from the stage results; flag sections built from degraded data."),
        ],
        fallback: FallbackNotice {
            actions: vec![
                "**Immediate:** Contact local health authorities directly".to_string(),
                "**Emergency Services:** Call 911 for any health emergencies".to_string(),
                "**Health Information:** Contact local health department".to_string(),
                "**Poison Control:** 1-800-222-1222".to_string(),
            ],
            resources: vec![
                "Local health department website".to_string(),
                "CDC website (cdc.gov)".to_string(),
                "WHO website (who.int)".to_string(),
                "State health department resources".to_string(),
            ],
            closing: "Please retry the analysis or consult healthcare providers directly for urgent needs.".to_string(),
        },
    }
}

/// First stage input: a readable prompt instead of the raw request JSON
fn location_prompt(request: &Request, _context: &PipelineContext) -> anyhow::Result<String> {
    Ok(format!(
        "Location: {}\nPatient context: {}\nUrgency: {}\nFocus: {}",
        request.subject,
        request.field_str("patient_context").unwrap_or("General population"),
        request.urgency,
        request.depth.as_deref().unwrap_or("comprehensive"),
    ))
}

/// Clinical decision support: a flat team converging on one report
pub fn clinical_decision_team() -> TeamDefinition {
    TeamDefinition {
        name: "clinical-decision",
        description: "Clinical decision support for a patient case",
        stages: vec![
            stage("assessment"),
            stage("treatment"),
            stage("safety"),
            stage("documentation"),
        ],
        synthesizer: stage("report"),
        roles: vec![
            role("assessment", "Assess the patient presentation and list differential considerations."),
            role("treatment", "Compare evidence-based treatment options for the case."),
            role("safety", "Identify contraindications, interactions and monitoring needs."),
            role("documentation", "Draft structured clinical documentation for the case."),
            role("report", "Merge the team's findings into one clinical decision summary; flag sections built from degraded data."),
        ],
        fallback: FallbackNotice {
            actions: vec![
                "Consult the attending clinician directly".to_string(),
                "Follow local clinical protocols until the analysis is available".to_string(),
                "Call 911 for any medical emergency".to_string(),
            ],
            resources: Vec::new(),
            closing: "Please retry the analysis.".to_string(),
        },
    }
}

/// Homepage generation: crawl, plan, write sections, compose
pub fn homepage_team() -> TeamDefinition {
    const SECTIONS: [&str; 6] = [
        "seo",
        "above_the_fold",
        "value_proposition",
        "use_cases",
        "social_proof",
        "call_to_action",
    ];

    let mut stages = vec![
        stage("crawl").fatal(),
        stage("strategy").requires(["crawl"]),
    ];
    stages.extend(
        SECTIONS
            .iter()
            .map(|id| stage(id).requires(["crawl", "strategy"])),
    );

    TeamDefinition {
        name: "homepage",
        description: "Homepage content generated from an existing website",
        stages,
        synthesizer: stage("composer"),
        roles: vec![
            role("crawl", "Describe the website at the given URL: purpose, audience, current messaging."),
            role("strategy", "Develop the narrative and messaging approach for the new homepage."),
            role("seo", "Propose search-optimized titles, meta descriptions and keywords."),
            role("above_the_fold", "Write the hero section: headline, subheadline, primary call to action."),
            role("value_proposition", "Write the benefit statements and unique value messaging."),
            role("use_cases", "Write use case sections for each audience segment."),
            role("social_proof", "Write trust-building content: testimonials, logos, metrics."),
            role("call_to_action", "Write the calls to action placed throughout the page."),
            role("composer", "Assemble every section into one homepage document in the requested format."),
        ],
        fallback: FallbackNotice::default(),
    }
}

/// All preset teams
pub fn all_teams() -> Vec<TeamDefinition> {
    vec![
        location_intelligence_team(),
        clinical_decision_team(),
        homepage_team(),
    ]
}

/// Look up a preset team by name
pub fn find_team(name: &str) -> Result<TeamDefinition, ConfigError> {
    all_teams()
        .into_iter()
        .find(|t| t.name == name)
        .ok_or_else(|| ConfigError::UnknownTeam(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skills::FnWorker;
    use crate::swarm::{CoordinatorConfig, Payload};

    fn stub_registry(team: &TeamDefinition) -> WorkerRegistry {
        let mut registry = WorkerRegistry::new();
        for spec in &team.roles {
            registry.register(
                spec.role,
                std::sync::Arc::new(FnWorker::new(spec.role, |_: &str, _: &str| Ok(Payload::new()))),
            );
        }
        registry
    }

    #[test]
    fn test_every_team_resolves() {
        for team in all_teams() {
            let orchestrator = team.orchestrator(&stub_registry(&team)).unwrap();
            let order = orchestrator.execution_order();
            assert_eq!(order.len(), team.stages.len() + 1, "{}", team.name);
            assert_eq!(order.last(), Some(&team.synthesizer.stage_id.as_str()));
        }
    }

    #[test]
    fn test_every_stage_has_instructions() {
        for team in all_teams() {
            for id in team.stage_ids() {
                assert!(team.instructions(id).is_some(), "{} lacks {}", team.name, id);
            }
        }
    }

    #[test]
    fn test_location_chain_order() {
        let team = location_intelligence_team();
        let orchestrator = team.orchestrator(&stub_registry(&team)).unwrap();
        assert_eq!(
            orchestrator.execution_order(),
            vec!["geographic", "epidemiological", "resources", "risk", "report"]
        );
    }

    #[test]
    fn test_clinical_team_is_flat() {
        let team = clinical_decision_team();
        assert!(team.stages.iter().all(|d| d.requires.is_empty()));

        let orchestrator = team.orchestrator(&stub_registry(&team)).unwrap();
        assert_eq!(orchestrator.waves().len(), 2);
    }

    #[test]
    fn test_homepage_crawl_is_fatal() {
        let team = homepage_team();
        let crawl = team.stages.iter().find(|d| d.stage_id == "crawl").unwrap();
        assert!(crawl.fatal);

        let orchestrator = team.orchestrator(&stub_registry(&team)).unwrap();
        let waves = orchestrator.waves();
        assert_eq!(waves[0], vec!["crawl"]);
        assert_eq!(waves[1], vec!["strategy"]);
        assert_eq!(waves[2].len(), 6);
        assert_eq!(waves[3], vec!["composer"]);
    }

    #[test]
    fn test_execution_waves_match_orchestrator() {
        for team in all_teams() {
            let orchestrator = team.orchestrator(&stub_registry(&team)).unwrap();
            assert_eq!(team.execution_waves().unwrap(), orchestrator.waves(), "{}", team.name);
        }
    }

    #[test]
    fn test_location_prompt_defaults() {
        let request = Request::new("Austin, Texas");
        let context = PipelineContext::new(request.clone());
        let prompt = location_prompt(&request, &context).unwrap();

        assert!(prompt.contains("Location: Austin, Texas"));
        assert!(prompt.contains("Patient context: General population"));
        assert!(prompt.contains("Urgency: routine"));
    }

    #[test]
    fn test_find_team() {
        assert_eq!(find_team("homepage").unwrap().name, "homepage");
        assert_eq!(
            find_team("marketing").unwrap_err(),
            ConfigError::UnknownTeam("marketing".to_string())
        );
    }

    #[test]
    fn test_llm_registry_covers_roles() {
        let team = clinical_decision_team();
        let registry = team.llm_registry(&LlmWorkerFactory::new(&CoordinatorConfig::default()));
        assert_eq!(
            registry.roles(),
            vec!["assessment", "documentation", "report", "safety", "treatment"]
        );
    }
}
