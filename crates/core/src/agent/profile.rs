//! Agent profile definitions
//!
//! Profiles are compiled-in constants. Each one carries the skills and the
//! ordered workflow that get rendered into the worker's instruction payload,
//! plus a wall-clock timeout tuned to the kind of work the agent does.

use serde::Serialize;

/// Broad capability area a skill belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillCategory {
    File,
    Web,
    Browser,
    Shell,
    Api,
}

/// One capability an agent advertises in its instructions.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSkill {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub category: SkillCategory,
    pub enabled: bool,
}

/// One ordered step of an agent's working method.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStep {
    pub step: u8,
    pub name: &'static str,
    pub description: &'static str,
    pub required: bool,
}

/// A worker persona the dispatcher can select.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentProfile {
    pub id: &'static str,
    pub name: &'static str,
    pub role: &'static str,
    pub skills: &'static [AgentSkill],
    pub workflow: &'static [WorkflowStep],
    /// Wall-clock budget for one run, in seconds.
    pub default_timeout_secs: u64,
}

impl AgentProfile {
    pub fn enabled_skills(&self) -> impl Iterator<Item = &'static AgentSkill> {
        self.skills.iter().filter(|s| s.enabled)
    }
}

pub(super) static DEVELOPER: AgentProfile = AgentProfile {
    id: "developer",
    name: "Developer Agent",
    role: "Code architect - implementation, debugging, browser-verified testing",
    skills: &[
        AgentSkill {
            id: "code-generation",
            name: "Code Generation",
            description: "Production-ready code with tests",
            category: SkillCategory::File,
            enabled: true,
        },
        AgentSkill {
            id: "browser-testing",
            name: "Browser Testing",
            description: "End-to-end checks via browser automation",
            category: SkillCategory::Browser,
            enabled: true,
        },
        AgentSkill {
            id: "screenshot-capture",
            name: "Screenshot Capture",
            description: "Visual evidence for validation",
            category: SkillCategory::Browser,
            enabled: true,
        },
        AgentSkill {
            id: "file-operations",
            name: "File Operations",
            description: "Read, write and modify project files",
            category: SkillCategory::File,
            enabled: true,
        },
        AgentSkill {
            id: "dependency-analysis",
            name: "Dependency Analysis",
            description: "Impact analysis across dependencies",
            category: SkillCategory::Shell,
            enabled: true,
        },
        AgentSkill {
            id: "bug-diagnosis",
            name: "Bug Diagnosis",
            description: "Root-cause and fix defects",
            category: SkillCategory::File,
            enabled: true,
        },
    ],
    workflow: &[
        WorkflowStep {
            step: 1,
            name: "ANALYZE",
            description: "Read requirements and existing patterns",
            required: true,
        },
        WorkflowStep {
            step: 2,
            name: "PLAN",
            description: "Identify files to change and the strategy",
            required: true,
        },
        WorkflowStep {
            step: 3,
            name: "IMPLEMENT",
            description: "Write the code",
            required: true,
        },
        WorkflowStep {
            step: 4,
            name: "TEST",
            description: "Verify via automated or manual checks",
            required: true,
        },
        WorkflowStep {
            step: 5,
            name: "CAPTURE",
            description: "Screenshots as evidence where relevant",
            required: false,
        },
        WorkflowStep {
            step: 6,
            name: "REPORT",
            description: "Structured summary of changes",
            required: true,
        },
    ],
    default_timeout_secs: 600,
};

pub(super) static RESEARCHER: AgentProfile = AgentProfile {
    id: "researcher",
    name: "Researcher Agent",
    role: "Knowledge navigator - investigation, exploration, synthesis",
    skills: &[
        AgentSkill {
            id: "web-search",
            name: "Web Search",
            description: "Search and evaluate external sources",
            category: SkillCategory::Web,
            enabled: true,
        },
        AgentSkill {
            id: "doc-analysis",
            name: "Documentation Analysis",
            description: "Digest reference docs and standards",
            category: SkillCategory::Web,
            enabled: true,
        },
        AgentSkill {
            id: "codebase-exploration",
            name: "Codebase Exploration",
            description: "Map unfamiliar code",
            category: SkillCategory::File,
            enabled: true,
        },
        AgentSkill {
            id: "api-investigation",
            name: "API Investigation",
            description: "Probe and document external APIs",
            category: SkillCategory::Api,
            enabled: true,
        },
        AgentSkill {
            id: "pattern-discovery",
            name: "Pattern Discovery",
            description: "Identify recurring designs and conventions",
            category: SkillCategory::File,
            enabled: true,
        },
        AgentSkill {
            id: "report-generation",
            name: "Report Generation",
            description: "Findings written up with sources",
            category: SkillCategory::File,
            enabled: true,
        },
    ],
    workflow: &[
        WorkflowStep {
            step: 1,
            name: "CLARIFY",
            description: "Pin down the actual question",
            required: true,
        },
        WorkflowStep {
            step: 2,
            name: "SEARCH",
            description: "Gather candidate sources",
            required: true,
        },
        WorkflowStep {
            step: 3,
            name: "EXPLORE",
            description: "Dig into code and docs",
            required: true,
        },
        WorkflowStep {
            step: 4,
            name: "SYNTHESIZE",
            description: "Reconcile findings into an answer",
            required: true,
        },
        WorkflowStep {
            step: 5,
            name: "DOCUMENT",
            description: "Write up results",
            required: true,
        },
        WorkflowStep {
            step: 6,
            name: "RECOMMEND",
            description: "Actionable next steps",
            required: false,
        },
    ],
    default_timeout_secs: 480,
};

pub(super) static CONTENT: AgentProfile = AgentProfile {
    id: "content",
    name: "Content Agent",
    role: "Documentation writer - READMEs, guides, changelogs",
    skills: &[
        AgentSkill {
            id: "readme-generation",
            name: "README Generation",
            description: "Project overviews that stay accurate",
            category: SkillCategory::File,
            enabled: true,
        },
        AgentSkill {
            id: "api-documentation",
            name: "API Documentation",
            description: "Endpoint and type reference docs",
            category: SkillCategory::File,
            enabled: true,
        },
        AgentSkill {
            id: "code-commenting",
            name: "Code Commenting",
            description: "Inline docs where they earn their keep",
            category: SkillCategory::File,
            enabled: true,
        },
        AgentSkill {
            id: "tutorial-creation",
            name: "Tutorial Creation",
            description: "Step-by-step guides",
            category: SkillCategory::File,
            enabled: true,
        },
        AgentSkill {
            id: "changelog-management",
            name: "Changelog Management",
            description: "Release notes from change history",
            category: SkillCategory::File,
            enabled: true,
        },
        AgentSkill {
            id: "style-consistency",
            name: "Style Consistency",
            description: "One voice across all docs",
            category: SkillCategory::File,
            enabled: true,
        },
    ],
    workflow: &[
        WorkflowStep {
            step: 1,
            name: "AUDIT",
            description: "Review what documentation exists",
            required: true,
        },
        WorkflowStep {
            step: 2,
            name: "GATHER",
            description: "Collect facts from code and owners",
            required: true,
        },
        WorkflowStep {
            step: 3,
            name: "STRUCTURE",
            description: "Outline before writing",
            required: true,
        },
        WorkflowStep {
            step: 4,
            name: "WRITE",
            description: "Draft the content",
            required: true,
        },
        WorkflowStep {
            step: 5,
            name: "REVIEW",
            description: "Check accuracy against the code",
            required: true,
        },
        WorkflowStep {
            step: 6,
            name: "FORMAT",
            description: "Consistent markdown and layout",
            required: false,
        },
    ],
    default_timeout_secs: 420,
};

pub(super) static DEVOPS: AgentProfile = AgentProfile {
    id: "devops",
    name: "DevOps Agent",
    role: "Infrastructure engineer - CI/CD, containers, environments",
    skills: &[
        AgentSkill {
            id: "docker-management",
            name: "Docker Management",
            description: "Images, compose files, registries",
            category: SkillCategory::Shell,
            enabled: true,
        },
        AgentSkill {
            id: "ci-cd-pipelines",
            name: "CI/CD Pipelines",
            description: "Build and deploy workflows",
            category: SkillCategory::Shell,
            enabled: true,
        },
        AgentSkill {
            id: "environment-config",
            name: "Environment Config",
            description: "Secrets and per-environment settings",
            category: SkillCategory::File,
            enabled: true,
        },
        AgentSkill {
            id: "dependency-security",
            name: "Dependency Security",
            description: "Audit and patch vulnerable dependencies",
            category: SkillCategory::Shell,
            enabled: true,
        },
        AgentSkill {
            id: "performance-monitoring",
            name: "Performance Monitoring",
            description: "Metrics and alerting hooks",
            category: SkillCategory::Api,
            enabled: true,
        },
        AgentSkill {
            id: "infrastructure-scripting",
            name: "Infrastructure Scripting",
            description: "Provisioning and maintenance scripts",
            category: SkillCategory::Shell,
            enabled: true,
        },
    ],
    workflow: &[
        WorkflowStep {
            step: 1,
            name: "ASSESS",
            description: "Current state of the infrastructure",
            required: true,
        },
        WorkflowStep {
            step: 2,
            name: "PLAN",
            description: "Changes and rollback path",
            required: true,
        },
        WorkflowStep {
            step: 3,
            name: "CONFIGURE",
            description: "Apply configuration changes",
            required: true,
        },
        WorkflowStep {
            step: 4,
            name: "VALIDATE",
            description: "Prove the pipeline still works",
            required: true,
        },
        WorkflowStep {
            step: 5,
            name: "DOCUMENT",
            description: "Record what changed and why",
            required: true,
        },
        WorkflowStep {
            step: 6,
            name: "DEPLOY",
            description: "Roll out, watch, confirm",
            required: false,
        },
    ],
    default_timeout_secs: 540,
};

pub(super) static QA: AgentProfile = AgentProfile {
    id: "qa",
    name: "QA Agent",
    role: "Quality assurance - regression, edge cases, audits",
    skills: &[
        AgentSkill {
            id: "regression-testing",
            name: "Regression Testing",
            description: "Re-run what used to work",
            category: SkillCategory::Browser,
            enabled: true,
        },
        AgentSkill {
            id: "edge-case-discovery",
            name: "Edge Case Discovery",
            description: "Inputs nobody thought about",
            category: SkillCategory::File,
            enabled: true,
        },
        AgentSkill {
            id: "accessibility-audit",
            name: "Accessibility Audit",
            description: "WCAG-level checks",
            category: SkillCategory::Browser,
            enabled: true,
        },
        AgentSkill {
            id: "performance-testing",
            name: "Performance Testing",
            description: "Latency and load behavior",
            category: SkillCategory::Browser,
            enabled: true,
        },
        AgentSkill {
            id: "cross-browser-testing",
            name: "Cross-Browser Testing",
            description: "Consistency across engines",
            category: SkillCategory::Browser,
            enabled: true,
        },
        AgentSkill {
            id: "test-report-generation",
            name: "Test Report Generation",
            description: "Results written up with repro steps",
            category: SkillCategory::File,
            enabled: true,
        },
    ],
    workflow: &[
        WorkflowStep {
            step: 1,
            name: "SCOPE",
            description: "What is under test and what is not",
            required: true,
        },
        WorkflowStep {
            step: 2,
            name: "PLAN",
            description: "Test matrix and priorities",
            required: true,
        },
        WorkflowStep {
            step: 3,
            name: "EXECUTE",
            description: "Run the tests",
            required: true,
        },
        WorkflowStep {
            step: 4,
            name: "INVESTIGATE",
            description: "Reproduce and narrow failures",
            required: true,
        },
        WorkflowStep {
            step: 5,
            name: "REPORT",
            description: "Findings with evidence",
            required: true,
        },
        WorkflowStep {
            step: 6,
            name: "VERIFY",
            description: "Confirm fixes close the findings",
            required: false,
        },
    ],
    default_timeout_secs: 600,
};
