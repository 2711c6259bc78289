//! Concrete executors. Every instrument implements [`Instrument`] and
//! exposes a declared capability requirement and a bounded iteration budget.
//! The Registry ([`InstrumentRegistry`]) is the only place that names
//! concrete variants; callers elsewhere go through the trait object.

mod falcon;
mod note;
mod research;
mod synthesis;
mod vision;

pub use falcon::Falcon;
pub use note::Note;
pub use research::Research;
pub use synthesis::Synthesis;
pub use vision::{looks_like_image, Vision};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ConductorResult;
use crate::model::{InstrumentResult, TaskContext};
use crate::tools::ToolRegistry;

#[async_trait]
pub trait Instrument: Send + Sync {
    fn name(&self) -> &str;
    fn max_iterations(&self) -> u32;
    fn required_capabilities(&self) -> &[String];
    fn optional_capabilities(&self) -> &[String];

    async fn execute(
        &self,
        query: &str,
        context: &TaskContext,
    ) -> ConductorResult<InstrumentResult>;
}

/// Constructs and indexes all instruments by name. Construction fails if an
/// instrument's required capabilities can't be satisfied by the given Tool
/// Registry, per spec's "Each Instrument's declared required_capabilities
/// must be satisfiable by the Registry at construction time" invariant.
pub struct InstrumentRegistry {
    instruments: HashMap<String, Arc<dyn Instrument>>,
}

impl InstrumentRegistry {
    pub fn build(tools: &ToolRegistry) -> ConductorResult<Self> {
        let candidates: Vec<Arc<dyn Instrument>> = vec![
            Arc::new(Note::new()),
            Arc::new(Research::new()),
            Arc::new(Synthesis::new()),
            Arc::new(Vision::new()),
            Arc::new(Falcon::new()),
        ];

        let mut instruments = HashMap::new();
        for instrument in candidates {
            tools.resolve(
                instrument.required_capabilities(),
                instrument.optional_capabilities(),
            )?;
            instruments.insert(instrument.name().to_string(), instrument);
        }

        Ok(Self { instruments })
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Instrument>> {
        self.instruments.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.instruments.keys().cloned().collect()
    }
}

pub(crate) fn string_vec(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
