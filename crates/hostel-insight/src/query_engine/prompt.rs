//! Prompt assembly for the three model calls: SQL generation, grounded RAG
//! answers and the general fallback.
//!
//! Assembly is a pure function of its inputs. The returned text is exactly what
//! goes to the model and exactly what is echoed back in debug output.

use serde::{Deserialize, Serialize};

use super::envelope::{MemorySnippet, RetrievalHit};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    /// Schema-grounded NL to SQL.
    Bi,
    /// Passage-grounded answer with citations.
    Rag,
    /// Memory and schema only, used when retrieval found nothing.
    General,
}

/// Counts of context items left out to fit the character budget.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Truncation {
    pub dropped_passages: usize,
    pub dropped_memories: usize,
}

impl Truncation {
    pub fn is_truncated(&self) -> bool {
        self.dropped_passages > 0 || self.dropped_memories > 0
    }
}

/// Everything a prompt may draw on.
#[derive(Debug, Clone, Default)]
pub struct PromptContext {
    pub schema: String,
    pub passages: Vec<RetrievalHit>,
    pub memories: Vec<MemorySnippet>,
    /// Recent chat turns already formatted as `User:`/`Assistant:` lines.
    pub history: String,
}

/// Session facts collapsed from memory, fed to the SQL prompt as JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredMemory {
    pub session_block: Option<String>,
    pub session_rollno: Option<String>,
    pub session_allergies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_history: Option<String>,
}

impl StructuredMemory {
    /// First block and roll number win; allergies accumulate without duplicates.
    pub fn from_memories(memories: &[MemorySnippet], history: &str) -> Self {
        let mut state = StructuredMemory::default();
        for memory in memories {
            if let Some(block) = memory.fact("block") {
                state.session_block.get_or_insert_with(|| block.to_string());
            }
            if let Some(roll) = memory.fact("rollno") {
                state.session_rollno.get_or_insert_with(|| roll.to_string());
            }
            if let Some(allergy) = memory.fact("allergy") {
                if !state.session_allergies.iter().any(|a| a == allergy) {
                    state.session_allergies.push(allergy.to_string());
                }
            }
        }
        if !history.trim().is_empty() {
            state.conversation_history = Some(history.to_string());
        }
        state
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

#[derive(Debug, Clone)]
pub struct AssembledPrompt {
    pub kind: PromptKind,
    pub text: String,
    pub truncation: Truncation,
    /// Passages that made it into the prompt, in citation order.
    pub passages: Vec<RetrievalHit>,
    pub memories: Vec<MemorySnippet>,
    /// The `User memory` block as rendered, empty when there were no memories.
    pub memory_context: String,
}

#[derive(Debug, Clone)]
pub struct PromptAssembler {
    max_context_chars: usize,
}

impl PromptAssembler {
    pub fn new(max_context_chars: usize) -> Self {
        Self { max_context_chars }
    }

    pub fn assemble(&self, kind: PromptKind, user_text: &str, ctx: &PromptContext) -> AssembledPrompt {
        let question = user_text.trim();
        let (passages, memories, truncation) = match kind {
            PromptKind::Bi => (Vec::new(), ctx.memories.clone(), Truncation::default()),
            PromptKind::Rag => self.fit_to_budget(&ctx.passages, &ctx.memories),
            PromptKind::General => self.fit_to_budget(&[], &ctx.memories),
        };
        let memory_context = render_memory_context(&memories);

        let text = match kind {
            PromptKind::Bi => {
                let structured = StructuredMemory::from_memories(&memories, &ctx.history);
                bi_prompt(&structured.to_json(), &ctx.schema, question)
            }
            PromptKind::Rag => rag_prompt(&memory_context, &passages, question),
            PromptKind::General => general_prompt(&memory_context, &ctx.schema, question),
        };

        AssembledPrompt {
            kind,
            text,
            truncation,
            passages,
            memories,
            memory_context,
        }
    }

    /// Drops whole items, lowest score first (later item first on ties), until
    /// the passage and memory text fits the budget. Survivors keep their order.
    fn fit_to_budget(
        &self,
        passages: &[RetrievalHit],
        memories: &[MemorySnippet],
    ) -> (Vec<RetrievalHit>, Vec<MemorySnippet>, Truncation) {
        let mut items: Vec<(f32, usize)> = passages
            .iter()
            .map(|p| (p.score, p.text.chars().count()))
            .chain(memories.iter().map(|m| (m.score, m.text.chars().count())))
            .collect();
        let mut kept = vec![true; items.len()];
        let mut total: usize = items.iter().map(|(_, len)| len).sum();

        while total > self.max_context_chars {
            let victim = items
                .iter()
                .enumerate()
                .filter(|(i, _)| kept[*i])
                .min_by(|(ia, (sa, _)), (ib, (sb, _))| {
                    sa.partial_cmp(sb)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| ib.cmp(ia))
                })
                .map(|(i, _)| i);
            match victim {
                Some(i) => {
                    kept[i] = false;
                    total -= items[i].1;
                    items[i].1 = 0;
                }
                None => break,
            }
        }

        let (kept_passages, kept_memories) = kept.split_at(passages.len());
        let passages_out: Vec<RetrievalHit> = passages
            .iter()
            .zip(kept_passages)
            .filter(|(_, k)| **k)
            .map(|(p, _)| p.clone())
            .collect();
        let memories_out: Vec<MemorySnippet> = memories
            .iter()
            .zip(kept_memories)
            .filter(|(_, k)| **k)
            .map(|(m, _)| m.clone())
            .collect();
        let truncation = Truncation {
            dropped_passages: passages.len() - passages_out.len(),
            dropped_memories: memories.len() - memories_out.len(),
        };
        (passages_out, memories_out, truncation)
    }
}

pub fn render_memory_context(memories: &[MemorySnippet]) -> String {
    if memories.is_empty() {
        return String::new();
    }
    let lines: Vec<String> = memories
        .iter()
        .enumerate()
        .map(|(i, m)| format!("[M{}] {} (ts:{})", i + 1, m.text, m.timestamp()))
        .collect();
    format!("User memory (most relevant):\n{}\n\n", lines.join("\n"))
}

pub fn render_passages(passages: &[RetrievalHit]) -> String {
    passages
        .iter()
        .enumerate()
        .map(|(i, p)| format!("[{}] Source: {}\n{}", i + 1, p.source, p.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn bi_prompt(memory_json: &str, schema: &str, question: &str) -> String {
    format!(
        "You are a BI assistant generating SELECT-only SQL for SQLite.\n\
         \n\
         Here is a short JSON with known session context (may be empty):\n\
         {memory_json}\n\
         \n\
         Use this context to fill in reasonable defaults when the user omits details.\n\
         For example, if session_block is known and the user asks \"show available seats\"\n\
         without specifying the block, default to that block in the WHERE clause.\n\
         \n\
         Database schema (SQLite):\n\
         {schema}\n\
         \n\
         User question: {question}\n\
         \n\
         Rules:\n\
         1. Only return SQL wrapped in ```sql ... ```\n\
         2. No explanation, only SQL.\n\
         3. SELECT only.\n\
         4. If something is ambiguous and cannot be safely inferred even from the session context:\n   \
         - Ask ONE clear clarifying question instead of guessing.\n\
         5. If the user is asking to INSERT/UPDATE/DELETE or perform changes, respond\n   \
         exactly with: \"This requires the Management Agent.\"\n"
    )
}

fn rag_prompt(memory_context: &str, passages: &[RetrievalHit], question: &str) -> String {
    let memory = if memory_context.is_empty() {
        "(none)"
    } else {
        memory_context.trim_end()
    };
    let context = render_passages(passages);
    format!(
        "You are a factual and careful hostel information assistant. Use ONLY the context below. \
         Do not invent facts or use outside knowledge.\n\
         If the user's question asks for numbers or fees, return the exact values from the context. \
         If the answer is not present, say: \"I couldn't find that exact information in the knowledge base.\"\n\
         \n\
         Memory context (if present):\n\
         {memory}\n\
         \n\
         CONTEXT (top relevant passages):\n\
         {context}\n\
         \n\
         User question: {question}\n\
         \n\
         Answer in 1-3 short paragraphs. At the end, include a line 'Sources: [1],[2]' referencing \
         passage indices used. Keep the answer concise and friendly.\n"
    )
}

fn general_prompt(memory_context: &str, schema: &str, question: &str) -> String {
    format!(
        "You are a friendly and helpful hostel information assistant for parents and students.\n\
         Answer concisely and politely. If the user explicitly requests live data (counts, availability, \
         room occupancy), respond: 'I will check availability for you.' so the BI agent can be invoked.\n\
         \n\
         {memory_context}{schema}\n\
         User question: {question}\n\
         Answer briefly."
    )
}
