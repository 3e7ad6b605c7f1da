//! Fixed texts sent to the providers or returned in degraded mode.

/// Persona prepended as a system message on the OpenAI chat path.
pub const OPENAI_PERSONA: &str = "Você é o S.U.S.M.I, um assistente inteligente pessoal inspirado no JARVIS.
Você é educado, eficiente e prestativo. Você ajuda o usuário com:
- Gerenciamento de tarefas e agenda
- Resposta a perguntas
- Automação de atividades
- Análise de informações

Responda sempre em português brasileiro, de forma clara e concisa.";

/// Persona passed through the `system` parameter of the Anthropic messages API.
pub const ANTHROPIC_PERSONA: &str = "Você é o S.U.S.M.I, um assistente inteligente pessoal inspirado no JARVIS.
Você é educado, eficiente e prestativo. Responda sempre em português brasileiro.";

/// Chat reply when no provider key is configured.
pub const CHAT_FALLBACK: &str = "🔧 O serviço de IA precisa ser configurado. Por favor, adicione sua chave de API (OpenAI ou Anthropic) no arquivo .env para habilitar respostas inteligentes.";

/// Analyze reply when the OpenAI key is missing.
pub const ANALYZE_FALLBACK: &str = "Configure a chave de API para usar análise de texto.";

pub const ANALYSIS_SYSTEM: &str = "Você é um assistente de análise de texto.";

pub const SUGGESTIONS: [&str; 3] = [
    "Você tem 3 tarefas pendentes para hoje",
    "Considere agendar uma pausa às 15h",
    "Seu relatório mensal está pendente",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisTask {
    Summarize,
    Extract,
    Classify,
}

impl AnalysisTask {
    /// Unknown labels are analysed as summaries.
    pub fn from_label(label: &str) -> Self {
        match label {
            "extract" => AnalysisTask::Extract,
            "classify" => AnalysisTask::Classify,
            _ => AnalysisTask::Summarize,
        }
    }

    pub fn prompt(self, text: &str) -> String {
        match self {
            AnalysisTask::Summarize => {
                format!("Resuma o seguinte texto de forma concisa:\n\n{}", text)
            }
            AnalysisTask::Extract => {
                format!("Extraia as informações principais do seguinte texto:\n\n{}", text)
            }
            AnalysisTask::Classify => format!(
                "Classifique o seguinte texto por categoria e sentimento:\n\n{}",
                text
            ),
        }
    }
}
