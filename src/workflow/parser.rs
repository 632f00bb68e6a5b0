//! Workflow Definition Parser
//!
//! Loads workflow creation requests from YAML files. A file holds either a
//! plain list of definitions or a document with a `workflows` key.
//!
//! Steps may declare a simulated `outcome` (`completed` or `failed`) that a
//! driver reports back through the explicit step update path.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::Deserialize;
use thiserror::Error;

use super::model::{NewStep, NewWorkflow, WorkflowMetadata, WorkflowType};
use super::status::StepStatus;

/// Errors raised while loading definition files.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Definition file contains no workflows")]
    Empty,
}

/// A step plus the outcome its owning module should report.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct StepDefinition {
    #[serde(flatten)]
    pub step: NewStep,

    #[serde(default)]
    pub outcome: Option<StepStatus>,
}

/// A single workflow definition from a file.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    #[serde(rename = "type", default)]
    pub workflow_type: Option<WorkflowType>,

    #[serde(default)]
    pub metadata: WorkflowMetadata,

    #[serde(default)]
    pub steps: Vec<StepDefinition>,
}

impl WorkflowDefinition {
    /// Builds the creation request, dropping simulated outcomes.
    pub fn to_request(&self) -> NewWorkflow {
        NewWorkflow {
            workflow_type: self.workflow_type,
            steps: self.steps.iter().map(|s| s.step.clone()).collect(),
            metadata: self.metadata.clone(),
        }
    }

    /// Returns `(step position, outcome)` for steps that declare one.
    pub fn outcomes(&self) -> Vec<(usize, StepStatus)> {
        self.steps
            .iter()
            .enumerate()
            .filter_map(|(index, s)| s.outcome.map(|outcome| (index, outcome)))
            .collect()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DefinitionFile {
    List(Vec<WorkflowDefinition>),
    Document { workflows: Vec<WorkflowDefinition> },
}

/// Parses definitions from YAML text.
pub fn parse_definitions(content: &str) -> Result<Vec<WorkflowDefinition>, LoadError> {
    let definitions = match serde_yaml::from_str::<DefinitionFile>(content)? {
        DefinitionFile::List(list) => list,
        DefinitionFile::Document { workflows } => workflows,
    };

    if definitions.is_empty() {
        return Err(LoadError::Empty);
    }

    for definition in &definitions {
        debug!(
            "Parsed definition {:?} with {} steps",
            definition.workflow_type,
            definition.steps.len()
        );
    }

    Ok(definitions)
}

/// Loads definitions from a YAML file.
///
/// Validation of each definition happens when it is submitted to the
/// engine, so a file may mix valid and invalid entries.
pub fn load_definitions(path: impl AsRef<Path>) -> Result<Vec<WorkflowDefinition>, LoadError> {
    let path = path.as_ref();
    info!("Loading workflow definitions from: {}", path.display());

    let content = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let definitions = parse_definitions(&content)?;
    info!("Loaded {} workflow definitions", definitions.len());
    Ok(definitions)
}
