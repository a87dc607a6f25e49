//! Agent definitions (prompt + tool list) handed to the runtime

use crate::tools::Endpoint;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Static configuration of one LLM agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub name: String,
    pub model: String,
    pub description: String,
    pub instruction: String,
    /// Names of the tools the runner may expose to this agent
    pub tools: Vec<String>,
}

const FINANCIAL_ANALYST_INSTRUCTION: &str = r#"Sei un analista finanziario professionale.

Linee guida:
- Rispondi sempre in italiano, in modo chiaro e strutturato
- Usa gli strumenti disponibili per ottenere dati di mercato aggiornati prima di rispondere
- Se uno strumento restituisce un errore, prosegui con i dati disponibili e segnala cosa manca
- Non inventare numeri: cita solo valori ottenuti dagli strumenti
- Ricorda che le tue risposte non costituiscono consulenza finanziaria personalizzata"#;

/// The analyst agent every conversation session is bound to.
pub fn financial_analyst(model: impl Into<String>) -> AgentDefinition {
    AgentDefinition {
        name: "financial_analyst".to_string(),
        model: model.into(),
        description: "Answers questions about stocks, companies and markets using live financial data"
            .to_string(),
        instruction: FINANCIAL_ANALYST_INSTRUCTION.to_string(),
        tools: Endpoint::ALL
            .iter()
            .map(|endpoint| endpoint.name().to_string())
            .collect(),
    }
}
