//! Routes one user turn through the BI or informational path and packages the
//! outcome as a `ResponseEnvelope`. Nothing here returns an error to the
//! caller: every failure ends up in the envelope's `error` field.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::chart;
use super::envelope::{
    sort_by_score_desc, BiEnvelope, InformationalEnvelope, MemorySnippet, Request, ResponseEnvelope,
    RetrievalHit, SourceRef,
};
use super::executor::SqlExecutor;
use super::intent::{Intent, IntentRouter};
use super::prompt::{PromptAssembler, PromptContext, PromptKind};
use super::row::Row;
use super::sql_guard;
use crate::background::{spawn_non_critical, with_timeout_and_retry};
use crate::config::Config;
use crate::error::PipelineError;
use crate::knowledge::Retriever;
use crate::llm::LanguageModel;
use crate::memory::{format_for_prompt, ChatHistoryStore, Message, Role};
use crate::memory_db::{extract_fact, SessionMemory, TurnRecord};
use crate::metrics;
use crate::utils::TextUtils;

const PREVIEW_ROWS: usize = 8;
const PREVIEW_CELL_CHARS: usize = 60;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub retrieval_top_k: usize,
    pub memory_top_k: usize,
    pub history_limit: usize,
    pub adapter_timeout: Duration,
    pub max_context_chars: usize,
    /// Server-side switch; a request's `debug` flag only counts when this is on.
    pub debug_enabled: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            retrieval_top_k: 6,
            memory_top_k: 8,
            history_limit: 10,
            adapter_timeout: Duration::from_secs(5),
            max_context_chars: 6000,
            debug_enabled: true,
        }
    }
}

impl From<&Config> for OrchestratorConfig {
    fn from(config: &Config) -> Self {
        Self {
            retrieval_top_k: config.retrieval_top_k,
            memory_top_k: config.memory_top_k,
            history_limit: config.history_limit,
            adapter_timeout: config.adapter_timeout(),
            max_context_chars: config.max_context_chars,
            debug_enabled: config.debug_enabled,
        }
    }
}

pub struct QueryOrchestrator {
    llm: Arc<dyn LanguageModel>,
    executor: Arc<dyn SqlExecutor>,
    retriever: Arc<dyn Retriever>,
    memory: Arc<dyn SessionMemory>,
    history: Arc<dyn ChatHistoryStore>,
    router: IntentRouter,
    assembler: PromptAssembler,
    schema: String,
    config: OrchestratorConfig,
}

impl QueryOrchestrator {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        executor: Arc<dyn SqlExecutor>,
        retriever: Arc<dyn Retriever>,
        memory: Arc<dyn SessionMemory>,
        history: Arc<dyn ChatHistoryStore>,
        schema: String,
        config: OrchestratorConfig,
    ) -> Self {
        info!("Query orchestrator initialized (schema: {} chars)", schema.len());
        Self {
            llm,
            executor,
            retriever,
            memory,
            history,
            router: IntentRouter::new(),
            assembler: PromptAssembler::new(config.max_context_chars),
            schema,
            config,
        }
    }

    /// Handles one chat turn. Always produces an envelope.
    pub async fn handle(&self, request: &Request) -> ResponseEnvelope {
        self.handle_turn(request).await.0
    }

    /// Same as `handle`, also returning the detached memory-append task, if any.
    pub async fn handle_turn(&self, request: &Request) -> (ResponseEnvelope, Option<JoinHandle<()>>) {
        let question = request.message.trim();
        if question.is_empty() {
            metrics::inc_outcome("informational", "empty");
            return (
                ResponseEnvelope::Informational(InformationalEnvelope::with_answer("Please provide a question.")),
                None,
            );
        }

        let session_id = request.session_id.trim();
        let debug_output = request.debug && self.config.debug_enabled;
        let intent = self.router.classify(question);
        debug!("Classified '{}' as {}", question, intent.as_str());

        let (memories, passages) = match intent {
            Intent::Bi => (self.recall_memories(session_id, question).await, Vec::new()),
            Intent::Informational => {
                tokio::join!(
                    self.recall_memories(session_id, question),
                    self.retrieve_passages(question)
                )
            }
        };

        if let Some(envelope) = self.answer_from_memory(session_id, question, &memories, debug_output) {
            metrics::inc_outcome("memory", "ok");
            let assistant_text = envelope.answer.clone();
            let handle = self.record_turn(session_id, question, &assistant_text, "memory");
            return (ResponseEnvelope::Informational(envelope), handle);
        }

        let history = format_for_prompt(&self.history.recent(session_id, self.config.history_limit));

        match intent {
            Intent::Bi => {
                let mut envelope = self.bi_path(question, &memories, &history).await;
                if debug_output {
                    envelope.memory_context = Some(super::prompt::render_memory_context(&memories));
                    envelope.memory_used = Some(memories);
                }
                // failed turns are not remembered
                let handle = match (&envelope.error, &envelope.sql) {
                    (None, Some(sql)) => {
                        self.record_turn(session_id, question, &format!("ran BI query: {}", sql), "bi")
                    }
                    _ => None,
                };
                (ResponseEnvelope::Bi(envelope), handle)
            }
            Intent::Informational => {
                let envelope = self.informational_path(question, passages, memories, debug_output).await;
                let handle = if envelope.error.is_none() {
                    self.record_turn(session_id, question, &envelope.answer, "informational")
                } else {
                    None
                };
                (ResponseEnvelope::Informational(envelope), handle)
            }
        }
    }

    /// NL to SQL without memory or history, as served by the plain query endpoint.
    pub async fn run_bi_query(&self, question: &str) -> BiEnvelope {
        self.bi_path(question.trim(), &[], "").await
    }

    async fn recall_memories(&self, session_id: &str, question: &str) -> Vec<MemorySnippet> {
        if session_id.is_empty() {
            return Vec::new();
        }
        let k = self.config.memory_top_k;
        match with_timeout_and_retry("memory recall", self.config.adapter_timeout, || {
            self.memory.recall(session_id, question, k)
        })
        .await
        {
            Ok(mut memories) => {
                sort_by_score_desc(&mut memories, |m| m.score);
                memories
            }
            Err(e) => {
                warn!("Memory unavailable, continuing without it: {:#}", e);
                Vec::new()
            }
        }
    }

    async fn retrieve_passages(&self, question: &str) -> Vec<RetrievalHit> {
        let k = self.config.retrieval_top_k;
        match with_timeout_and_retry("retrieval", self.config.adapter_timeout, || {
            self.retriever.retrieve(question, k)
        })
        .await
        {
            Ok(mut hits) => {
                sort_by_score_desc(&mut hits, |h| h.score);
                hits
            }
            Err(e) => {
                warn!("Retrieval unavailable, continuing without passages: {:#}", e);
                Vec::new()
            }
        }
    }

    /// Answers "what is my block?"-style questions straight from recalled
    /// session facts, without a model call.
    fn answer_from_memory(
        &self,
        session_id: &str,
        question: &str,
        memories: &[MemorySnippet],
        debug_output: bool,
    ) -> Option<InformationalEnvelope> {
        if session_id.is_empty() || memories.is_empty() {
            return None;
        }
        let wanted = self.router.recall_fact(question)?;

        let answer = if let Some(value) = memories.iter().find_map(|m| m.fact(wanted)) {
            format!("I have a note for this session: {} = {}.", wanted, value)
        } else {
            let value = memories
                .iter()
                .filter(|m| m.text.starts_with("user:"))
                .filter_map(|m| extract_fact(&m.text))
                .find(|f| f.fact_type == wanted)?
                .value;
            format!("I found in memory: {} = {}.", wanted, value)
        };

        let mut envelope = InformationalEnvelope::with_answer(answer);
        envelope.memory_used = memories.to_vec();
        if debug_output {
            envelope.memory_context = Some(super::prompt::render_memory_context(memories));
        }
        Some(envelope)
    }

    async fn bi_path(&self, question: &str, memories: &[MemorySnippet], history: &str) -> BiEnvelope {
        let ctx = PromptContext {
            schema: self.schema.clone(),
            passages: Vec::new(),
            memories: memories.to_vec(),
            history: history.to_string(),
        };
        let prompt = self.assembler.assemble(PromptKind::Bi, question, &ctx);
        let mut envelope = BiEnvelope {
            prompt: prompt.text.clone(),
            ..BiEnvelope::default()
        };

        let raw = match self.llm.complete(&prompt.text).await {
            Ok(raw) => raw,
            Err(e) => return bi_failure(envelope, PipelineError::from(e)),
        };
        envelope.llm_raw = raw;

        let Some(sql) = sql_guard::extract(&envelope.llm_raw) else {
            // Usually a clarifying question or a refusal; show it as the answer.
            envelope.answer = envelope.llm_raw.trim().to_string();
            envelope.error = Some(PipelineError::ExtractionFailed.to_string());
            metrics::inc_outcome("bi", PipelineError::ExtractionFailed.kind());
            return envelope;
        };
        envelope.sql = Some(sql.clone());

        if let Err(violation) = sql_guard::check(&sql) {
            warn!("Rejected generated SQL: {}", violation);
            return bi_failure(envelope, PipelineError::from(violation));
        }
        envelope.safety_ok = true;

        match self.executor.execute(&sql).await {
            Ok(rows) => {
                envelope.chart = chart::infer(&rows, None);
                envelope.answer = bi_answer(&sql, &rows);
                envelope.data = rows;
                metrics::inc_outcome("bi", "ok");
                envelope
            }
            Err(e) => bi_failure(envelope, PipelineError::from(e)),
        }
    }

    async fn informational_path(
        &self,
        question: &str,
        passages: Vec<RetrievalHit>,
        memories: Vec<MemorySnippet>,
        debug_output: bool,
    ) -> InformationalEnvelope {
        let kb_hits: Vec<RetrievalHit> = passages.into_iter().filter(|h| h.score >= 0.0).collect();
        let kind = if kb_hits.is_empty() {
            PromptKind::General
        } else {
            PromptKind::Rag
        };
        let ctx = PromptContext {
            schema: self.schema.clone(),
            passages: kb_hits.clone(),
            memories: memories.clone(),
            history: String::new(),
        };
        let prompt = self.assembler.assemble(kind, question, &ctx);

        let mut envelope = InformationalEnvelope {
            sources: prompt
                .passages
                .iter()
                .enumerate()
                .map(|(i, p)| SourceRef {
                    idx: i + 1,
                    source: p.source.clone(),
                    score: p.score,
                })
                .collect(),
            kb_hits,
            memory_used: memories,
            ..InformationalEnvelope::default()
        };

        match self.llm.complete(&prompt.text).await {
            Ok(text) => {
                envelope.answer = text.trim().to_string();
                metrics::inc_outcome("informational", "ok");
            }
            Err(e) => {
                let err = PipelineError::from(e);
                warn!("Informational answer failed: {}", err);
                metrics::inc_outcome("informational", err.kind());
                envelope.error = Some(err.to_string());
            }
        }

        if debug_output {
            match kind {
                PromptKind::Rag => envelope.rag_prompt = Some(prompt.text.clone()),
                _ => envelope.llm_prompt = Some(prompt.text.clone()),
            }
            envelope.memory_context = Some(prompt.memory_context.clone());
            if prompt.truncation.is_truncated() {
                envelope.context_truncated = Some(prompt.truncation);
            }
        }
        envelope
    }

    /// Appends a successful turn to chat history now and to session memory in
    /// the background. Memory failures never reach the response.
    fn record_turn(
        &self,
        session_id: &str,
        question: &str,
        assistant_text: &str,
        kind: &'static str,
    ) -> Option<JoinHandle<()>> {
        if session_id.is_empty() {
            return None;
        }
        self.history.append(session_id, Message::new(Role::User, question));
        self.history.append(session_id, Message::new(Role::Assistant, assistant_text));

        let memory = Arc::clone(&self.memory);
        let session = session_id.to_string();
        let turn = TurnRecord {
            user_text: question.to_string(),
            assistant_text: assistant_text.to_string(),
            meta: serde_json::json!({ "type": kind }),
        };
        Some(spawn_non_critical("memory_append", async move {
            memory.append_turn(&session, turn).await
        }))
    }
}

fn bi_failure(mut envelope: BiEnvelope, err: PipelineError) -> BiEnvelope {
    metrics::inc_outcome("bi", err.kind());
    let message = err.to_string();
    envelope.answer = format!("Error running query: {}", message);
    envelope.error = Some(message);
    envelope
}

fn bi_answer(sql: &str, rows: &[Row]) -> String {
    format!(
        "I ran a data query and found {} row(s).\n\nSQL:\n\n```sql\n{}\n```\n\nPreview of results:\n\n{}",
        rows.len(),
        sql,
        tabular_preview(rows, PREVIEW_ROWS)
    )
}

/// Pipe-separated preview of the first `max_rows` rows, cells cut to 60 chars.
pub fn tabular_preview(rows: &[Row], max_rows: usize) -> String {
    let Some(first) = rows.first() else {
        return "(no rows)".to_string();
    };
    let headers: Vec<&str> = first.columns().collect();
    let mut lines = vec![headers.join(" | "), vec!["---"; headers.len()].join(" | ")];
    for row in rows.iter().take(max_rows) {
        let cells: Vec<String> = headers
            .iter()
            .map(|h| {
                let label = row.get(h).map(|v| v.to_label()).unwrap_or_default();
                let text = TextUtils::normalize_whitespace(&label);
                TextUtils::truncate_with_ellipsis(&text, PREVIEW_CELL_CHARS).into_owned()
            })
            .collect();
        lines.push(cells.join(" | "));
    }
    let mut preview = lines.join("\n");
    if rows.len() > max_rows {
        preview.push_str(&format!("\n\n...and {} more rows.", rows.len() - max_rows));
    }
    preview
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ExecutionError, LlmError};
    use crate::memory::InMemoryChatHistory;
    use crate::query_engine::envelope::MemoryPayload;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct RecordingModel {
        reply: Option<String>,
        prompts: Mutex<Vec<String>>,
    }

    impl RecordingModel {
        fn replying(text: &str) -> Arc<Self> {
            Arc::new(Self { reply: Some(text.to_string()), prompts: Mutex::new(Vec::new()) })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self { reply: None, prompts: Mutex::new(Vec::new()) })
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LanguageModel for RecordingModel {
        async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.reply
                .clone()
                .ok_or_else(|| LlmError::Unavailable("backend returned 503".into()))
        }
    }

    #[derive(Default)]
    struct FakeExecutor {
        rows: Vec<Row>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SqlExecutor for FakeExecutor {
        async fn execute(&self, _sql: &str) -> Result<Vec<Row>, ExecutionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.rows.clone())
        }
    }

    #[derive(Default)]
    struct FakeRetriever {
        hits: Vec<RetrievalHit>,
        fail: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Retriever for FakeRetriever {
        async fn retrieve(&self, _query: &str, k: usize) -> anyhow::Result<Vec<RetrievalHit>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("knowledge index is locked");
            }
            Ok(self.hits.iter().take(k).cloned().collect())
        }
    }

    #[derive(Default)]
    struct FakeMemory {
        recalled: Vec<MemorySnippet>,
        fail: bool,
        delay: Option<Duration>,
        recalls: AtomicUsize,
        appended: Mutex<Vec<(String, TurnRecord)>>,
    }

    #[async_trait]
    impl SessionMemory for FakeMemory {
        async fn recall(&self, _session_id: &str, _query: &str, k: usize) -> anyhow::Result<Vec<MemorySnippet>> {
            self.recalls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                anyhow::bail!("memory database is busy");
            }
            Ok(self.recalled.iter().take(k).cloned().collect())
        }

        async fn append_turn(&self, session_id: &str, turn: TurnRecord) -> anyhow::Result<()> {
            self.appended.lock().unwrap().push((session_id.to_string(), turn));
            Ok(())
        }
    }

    struct Harness {
        model: Arc<RecordingModel>,
        executor: Arc<FakeExecutor>,
        retriever: Arc<FakeRetriever>,
        memory: Arc<FakeMemory>,
        orchestrator: QueryOrchestrator,
    }

    fn harness(
        model: Arc<RecordingModel>,
        rows: Vec<Row>,
        hits: Vec<RetrievalHit>,
        recalled: Vec<MemorySnippet>,
        config: OrchestratorConfig,
    ) -> Harness {
        let retriever = FakeRetriever { hits, ..FakeRetriever::default() };
        let memory = FakeMemory { recalled, ..FakeMemory::default() };
        harness_with(model, rows, retriever, memory, config)
    }

    fn harness_with(
        model: Arc<RecordingModel>,
        rows: Vec<Row>,
        retriever: FakeRetriever,
        memory: FakeMemory,
        config: OrchestratorConfig,
    ) -> Harness {
        let executor = Arc::new(FakeExecutor { rows, ..FakeExecutor::default() });
        let retriever = Arc::new(retriever);
        let memory = Arc::new(memory);
        let orchestrator = QueryOrchestrator::new(
            model.clone(),
            executor.clone(),
            retriever.clone(),
            memory.clone(),
            Arc::new(InMemoryChatHistory::new()),
            "Table: seats\n  - block (TEXT, nullable=true)".to_string(),
            config,
        );
        Harness { model, executor, retriever, memory, orchestrator }
    }

    fn short_timeouts() -> OrchestratorConfig {
        OrchestratorConfig { adapter_timeout: Duration::from_millis(30), ..OrchestratorConfig::default() }
    }

    fn hit(source: &str, text: &str, score: f32) -> RetrievalHit {
        RetrievalHit { source: source.into(), text: text.into(), score, id: None }
    }

    fn block_memory(value: &str) -> MemorySnippet {
        MemorySnippet {
            text: format!("user: my block is {}", value),
            score: 0.9,
            payload: Some(MemoryPayload {
                role: Some("user".into()),
                ts: Some("2024-05-01T10:00:00+00:00".into()),
                fact_type: Some("block".into()),
                fact_value: Some(value.into()),
            }),
        }
    }

    fn seat_rows() -> Vec<Row> {
        vec![
            Row::new().with("block", "A").with("vacant", 12i64),
            Row::new().with("block", "B").with("vacant", 4i64),
        ]
    }

    #[tokio::test]
    async fn test_empty_message_never_calls_model() {
        let h = harness(RecordingModel::replying("x"), vec![], vec![], vec![], OrchestratorConfig::default());
        let envelope = h.orchestrator.handle(&Request::new("   ", "s1")).await;
        assert_eq!(envelope.path(), "informational");
        assert_eq!(envelope.answer(), "Please provide a question.");
        assert!(h.model.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_bi_prompt_round_trips_and_rows_are_charted() {
        let model = RecordingModel::replying(
            "```sql\nSELECT block, COUNT(*) AS vacant FROM seats GROUP BY block\n```",
        );
        let h = harness(model, seat_rows(), vec![], vec![], OrchestratorConfig::default());
        let envelope = h.orchestrator.handle(&Request::new("How many vacant seats per block?", "")).await;

        let ResponseEnvelope::Bi(bi) = envelope else { panic!("expected bi envelope") };
        assert_eq!(h.model.prompts(), vec![bi.prompt.clone()]);
        assert!(bi.safety_ok);
        assert_eq!(bi.sql.as_deref(), Some("SELECT block, COUNT(*) AS vacant FROM seats GROUP BY block"));
        assert_eq!(bi.data.len(), 2);
        assert_eq!(bi.chart.as_ref().map(|c| c.kind()), Some("pie"));
        assert!(bi.error.is_none());
        assert!(bi.answer.starts_with("I ran a data query and found 2 row(s)."));
        assert!(bi.answer.contains("block | vacant\n--- | ---\nA | 12\nB | 4"));
    }

    #[tokio::test]
    async fn test_unsafe_sql_is_never_executed() {
        let model = RecordingModel::replying("```sql\nDROP TABLE seats;\n```");
        let h = harness(model, seat_rows(), vec![], vec![], OrchestratorConfig::default());
        let envelope = h.orchestrator.handle(&Request::new("how many seats are there", "")).await;

        let ResponseEnvelope::Bi(bi) = envelope else { panic!("expected bi envelope") };
        assert!(!bi.safety_ok);
        assert_eq!(bi.sql.as_deref(), Some("DROP TABLE seats;"));
        assert!(bi.data.is_empty());
        assert!(bi.error.as_deref().unwrap().starts_with("Unsafe SQL rejected"));
        assert!(!bi.llm_raw.is_empty());
        assert_eq!(h.executor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_reply_without_sql_is_surfaced() {
        let model = RecordingModel::replying("Which block do you mean?");
        let h = harness(model, vec![], vec![], vec![], OrchestratorConfig::default());
        let ResponseEnvelope::Bi(bi) = h.orchestrator.handle(&Request::new("count seats", "")).await else {
            panic!("expected bi envelope")
        };
        assert_eq!(bi.error.as_deref(), Some("No SQL found in model response"));
        assert_eq!(bi.answer, "Which block do you mean?");
        assert!(bi.sql.is_none());
        assert!(!bi.safety_ok);
    }

    #[tokio::test]
    async fn test_model_failure_degrades_informational_answer() {
        let hits = vec![hit("fees.json", "hostel fees: 45000", 0.8)];
        let h = harness(RecordingModel::failing(), vec![], hits, vec![], OrchestratorConfig::default());
        let envelope = h.orchestrator.handle(&Request::new("Tell me about the mess", "")).await;

        let ResponseEnvelope::Informational(info) = envelope else { panic!("expected informational") };
        assert!(info.answer.is_empty());
        assert!(info.error.as_deref().unwrap().contains("temporarily unavailable"));
        assert_eq!(info.sources, vec![SourceRef { idx: 1, source: "fees.json".into(), score: 0.8 }]);
    }

    #[tokio::test]
    async fn test_negative_hits_fall_back_to_general_prompt() {
        let hits = vec![hit("faq.json", "unrelated", -0.2)];
        let model = RecordingModel::replying("Visiting hours are 4-6 pm.");
        let h = harness(model, vec![], hits, vec![], OrchestratorConfig::default());
        let request = Request::new("When can parents visit?", "").with_debug(true);
        let ResponseEnvelope::Informational(info) = h.orchestrator.handle(&request).await else {
            panic!("expected informational")
        };
        assert!(info.kb_hits.is_empty());
        assert!(info.sources.is_empty());
        assert_eq!(info.answer, "Visiting hours are 4-6 pm.");
        let prompt = info.llm_prompt.expect("general prompt in debug output");
        assert!(prompt.ends_with("User question: When can parents visit?\nAnswer briefly."));
        assert!(info.rag_prompt.is_none());
    }

    #[tokio::test]
    async fn test_debug_fields_need_server_switch() {
        let hits = vec![hit("fees.json", "hostel fees: 45000", 0.8)];
        let config = OrchestratorConfig { debug_enabled: false, ..OrchestratorConfig::default() };
        let h = harness(RecordingModel::replying("7 to 9 am"), vec![], hits, vec![], config);
        let request = Request::new("What are the mess timings?", "").with_debug(true);
        let json = serde_json::to_value(h.orchestrator.handle(&request).await).unwrap();
        assert_eq!(json["type"], "informational");
        assert!(json.get("rag_prompt").is_none());
        assert!(json.get("memory_context").is_none());
    }

    #[tokio::test]
    async fn test_memory_fact_answers_without_model() {
        let h = harness(
            RecordingModel::replying("unused"),
            vec![],
            vec![],
            vec![block_memory("3")],
            OrchestratorConfig::default(),
        );
        let envelope = h.orchestrator.handle(&Request::new("what is my block?", "s1")).await;
        assert_eq!(envelope.answer(), "I have a note for this session: block = 3.");
        assert!(h.model.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_data_question_about_my_block_runs_sql() {
        let model = RecordingModel::replying(
            "```sql\nSELECT COUNT(*) AS vacant FROM seats WHERE block = '3' AND status = 'vacant'\n```",
        );
        let rows = vec![Row::new().with("vacant", 7i64)];
        let h = harness(model, rows, vec![], vec![block_memory("3")], OrchestratorConfig::default());
        let envelope = h
            .orchestrator
            .handle(&Request::new("How many vacant seats are in my block?", "s1"))
            .await;

        let ResponseEnvelope::Bi(bi) = envelope else { panic!("expected bi envelope") };
        assert!(bi.safety_ok);
        assert_eq!(bi.data.len(), 1);
        assert_eq!(h.executor.calls.load(Ordering::SeqCst), 1);
        let prompts = h.model.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains(r#""session_block":"3""#));
    }

    #[tokio::test]
    async fn test_failing_adapters_are_retried_once_then_skipped() {
        let retriever = FakeRetriever { hits: vec![hit("fees.json", "fees", 0.9)], fail: true, ..Default::default() };
        let memory = FakeMemory { recalled: vec![block_memory("3")], fail: true, ..Default::default() };
        let model = RecordingModel::replying("Breakfast is at 7.");
        let h = harness_with(model, vec![], retriever, memory, short_timeouts());

        let envelope = h.orchestrator.handle(&Request::new("When is breakfast served?", "s1")).await;
        let ResponseEnvelope::Informational(info) = envelope else { panic!("expected informational") };
        assert_eq!(info.answer, "Breakfast is at 7.");
        assert!(info.error.is_none());
        assert!(info.kb_hits.is_empty());
        assert!(info.sources.is_empty());
        assert!(info.memory_used.is_empty());
        assert_eq!(h.memory.recalls.load(Ordering::SeqCst), 2);
        assert_eq!(h.retriever.calls.load(Ordering::SeqCst), 2);
        assert!(h.model.prompts()[0].ends_with("User question: When is breakfast served?\nAnswer briefly."));
    }

    #[tokio::test]
    async fn test_slow_memory_times_out_and_turn_still_answers() {
        let memory = FakeMemory {
            recalled: vec![block_memory("3")],
            delay: Some(Duration::from_millis(500)),
            ..Default::default()
        };
        let model = RecordingModel::replying("The warden sits in block A.");
        let h = harness_with(model, vec![], FakeRetriever::default(), memory, short_timeouts());

        let envelope = h.orchestrator.handle(&Request::new("Where does the warden sit?", "s1")).await;
        let ResponseEnvelope::Informational(info) = envelope else { panic!("expected informational") };
        assert_eq!(info.answer, "The warden sits in block A.");
        assert!(info.memory_used.is_empty());
        assert_eq!(h.memory.recalls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_bi_model_failure_keeps_prompt_and_skips_execution() {
        let h = harness(RecordingModel::failing(), seat_rows(), vec![], vec![], OrchestratorConfig::default());
        let (envelope, handle) = h.orchestrator.handle_turn(&Request::new("how many seats are vacant", "s1")).await;

        let ResponseEnvelope::Bi(bi) = envelope else { panic!("expected bi envelope") };
        assert!(!bi.safety_ok);
        assert!(bi.sql.is_none());
        assert!(bi.data.is_empty());
        assert!(bi.error.as_deref().unwrap().contains("temporarily unavailable"));
        assert!(bi.answer.starts_with("Error running query:"));
        assert_eq!(h.model.prompts(), vec![bi.prompt.clone()]);
        assert_eq!(h.executor.calls.load(Ordering::SeqCst), 0);
        assert!(handle.is_none());
    }

    #[tokio::test]
    async fn test_failed_informational_turn_is_not_remembered() {
        let h = harness(RecordingModel::failing(), vec![], vec![], vec![], OrchestratorConfig::default());
        let (envelope, handle) = h.orchestrator.handle_turn(&Request::new("Tell me about the gym", "s1")).await;
        assert!(envelope.error().is_some());
        assert!(handle.is_none());
        assert!(h.memory.appended.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_turn_is_appended_in_background() {
        let model = RecordingModel::replying("```sql\nSELECT block FROM seats\n```");
        let h = harness(model, seat_rows(), vec![], vec![], OrchestratorConfig::default());
        let (_, handle) = h.orchestrator.handle_turn(&Request::new("list seats by block", "s9")).await;
        handle.expect("append task").await.unwrap();

        let appended = h.memory.appended.lock().unwrap();
        assert_eq!(appended.len(), 1);
        assert_eq!(appended[0].0, "s9");
        assert_eq!(appended[0].1.assistant_text, "ran BI query: SELECT block FROM seats");
        assert_eq!(appended[0].1.meta["type"], "bi");
    }

    #[tokio::test]
    async fn test_no_session_means_no_memory_writes() {
        let h = harness(RecordingModel::replying("hi"), vec![], vec![], vec![], OrchestratorConfig::default());
        let (_, handle) = h.orchestrator.handle_turn(&Request::new("hello there", "")).await;
        assert!(handle.is_none());
    }

    #[test]
    fn test_preview_truncates_rows_and_cells() {
        let rows: Vec<Row> = (0..10i64)
            .map(|i| Row::new().with("n", i).with("note", "x".repeat(80)))
            .collect();
        let preview = tabular_preview(&rows, 8);
        let lines: Vec<&str> = preview.lines().collect();
        assert_eq!(lines[0], "n | note");
        assert_eq!(lines[1], "--- | ---");
        assert!(lines[2].ends_with(&format!("{}...", "x".repeat(57))));
        assert!(preview.ends_with("...and 2 more rows."));
        assert_eq!(tabular_preview(&[], 8), "(no rows)");
    }
}
