use crate::ids::AgentId;
use crate::types::{Agent, AgentConfig, AgentKind, AgentMetadata, AgentStatus};

/// The five agents every registry starts with.
///
/// No seeded agent declares `regulatory_analysis`, so `analysis` tasks find no
/// match until a caller registers an agent that does.
pub fn default_agents() -> Vec<Agent> {
    vec![
        sfdr_specialist(),
        aml_analyst(),
        regulatory_researcher(),
        compliance_coordinator(),
        validation_agent(),
    ]
}

fn sfdr_specialist() -> Agent {
    Agent {
        id: AgentId::new("sfdr-specialist"),
        name: "SFDR Compliance Specialist".to_string(),
        kind: AgentKind::Specialist,
        capabilities: capabilities(&[
            "sfdr_analysis",
            "esg_assessment",
            "regulatory_interpretation",
        ]),
        status: AgentStatus::Idle,
        metadata: metadata(
            "Specialized in SFDR compliance and ESG regulations",
            &["SFDR", "ESG", "EU Taxonomy", "Sustainability Reporting"],
            3,
            5000,
            0.95,
        ),
        config: config(0.1, 2000, 30_000, 3),
    }
}

fn aml_analyst() -> Agent {
    Agent {
        id: AgentId::new("aml-analyst"),
        name: "AML Risk Analyst".to_string(),
        kind: AgentKind::Analyst,
        capabilities: capabilities(&["aml_screening", "risk_assessment", "transaction_analysis"]),
        status: AgentStatus::Idle,
        metadata: metadata(
            "Anti-Money Laundering analysis and risk assessment",
            &["AML", "KYC", "Transaction Monitoring", "Risk Scoring"],
            5,
            3000,
            0.92,
        ),
        config: config(0.05, 1500, 25_000, 2),
    }
}

fn regulatory_researcher() -> Agent {
    Agent {
        id: AgentId::new("regulatory-researcher"),
        name: "Regulatory Research Agent".to_string(),
        kind: AgentKind::Researcher,
        capabilities: capabilities(&["regulatory_search", "document_analysis", "change_detection"]),
        status: AgentStatus::Idle,
        metadata: metadata(
            "Research and analysis of regulatory changes and requirements",
            &["Regulatory Research", "Document Analysis", "Change Management"],
            4,
            8000,
            0.88,
        ),
        config: config(0.2, 2500, 45_000, 3),
    }
}

fn compliance_coordinator() -> Agent {
    Agent {
        id: AgentId::new("compliance-coordinator"),
        name: "Compliance Coordination Agent".to_string(),
        kind: AgentKind::Coordinator,
        capabilities: capabilities(&[
            "workflow_coordination",
            "task_delegation",
            "quality_assurance",
        ]),
        status: AgentStatus::Idle,
        metadata: metadata(
            "Coordinates complex compliance workflows and ensures quality",
            &["Workflow Management", "Quality Assurance", "Task Coordination"],
            10,
            2000,
            0.97,
        ),
        config: config(0.1, 1000, 15_000, 2),
    }
}

fn validation_agent() -> Agent {
    Agent {
        id: AgentId::new("validation-agent"),
        name: "Compliance Validator".to_string(),
        kind: AgentKind::Validator,
        capabilities: capabilities(&[
            "result_validation",
            "accuracy_checking",
            "compliance_verification",
        ]),
        status: AgentStatus::Idle,
        metadata: metadata(
            "Validates compliance analysis results and ensures accuracy",
            &["Result Validation", "Accuracy Assessment", "Quality Control"],
            6,
            4000,
            0.99,
        ),
        config: config(0.05, 1200, 20_000, 1),
    }
}

fn capabilities(caps: &[&str]) -> std::collections::BTreeSet<String> {
    caps.iter().map(|c| (*c).to_string()).collect()
}

fn metadata(
    description: &str,
    expertise: &[&str],
    max_concurrent_tasks: u32,
    average_response_time: u64,
    success_rate: f64,
) -> AgentMetadata {
    AgentMetadata {
        version: "1.0.0".to_string(),
        description: description.to_string(),
        expertise: expertise.iter().map(|e| (*e).to_string()).collect(),
        max_concurrent_tasks,
        average_response_time,
        success_rate,
    }
}

fn config(temperature: f32, max_tokens: u32, timeout: u64, retry_attempts: u32) -> AgentConfig {
    AgentConfig {
        temperature,
        max_tokens,
        timeout,
        retry_attempts,
    }
}
