//! Analysis orchestrator
//!
//! CLASSIFY → RESERVE TURN → (PROGRESS ‖ ANALYZE) → SETTLE → RESOLVE TURN
//!
//! The progress simulator and the analysis request only meet at the start
//! (simulator begins) and at settlement (simulator stops, then the pending
//! turn is resolved).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

use crate::backend::{AnalyzeRequest, PortfolioBackend};
use crate::classifier::{QueryClassifier, QueryIntent};
use crate::error::ChatError;
use crate::memory::{ConversationSession, HistoryConfig};
use crate::models::{HoldingsSnapshot, ResponseModel};
use crate::render::ResponseRenderer;
use crate::Result;

pub mod progress;
pub use progress::{ProgressPhase, ProgressSimulator, ProgressSnapshot, ProgressStage, STAGES};

/// Configuration for the orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Cadence of the simulated progress stages
    pub progress_tick: Duration,
    pub history: HistoryConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            progress_tick: progress::DEFAULT_TICK,
            history: HistoryConfig::default(),
        }
    }
}

/// Runs one query at a time against the analysis backend
pub struct AnalysisOrchestrator {
    backend: Arc<dyn PortfolioBackend>,
    config: OrchestratorConfig,
    progress: Arc<watch::Sender<ProgressSnapshot>>,
    in_flight: AtomicBool,
    runs: AtomicU64,
}

/// Clears the in-flight flag however the run ends, including when the run
/// future is dropped
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ChatError::Busy)?;
        Ok(Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Progress publishing for one run. Settles exactly once, either explicitly
/// or when the run future is dropped mid-flight.
struct RunProgress<'a> {
    progress: &'a watch::Sender<ProgressSnapshot>,
    simulator: Option<ProgressSimulator>,
    run: u64,
    intent: QueryIntent,
    settled: bool,
}

impl<'a> RunProgress<'a> {
    fn begin(
        progress: &'a Arc<watch::Sender<ProgressSnapshot>>,
        run: u64,
        intent: QueryIntent,
        tick: Duration,
    ) -> Self {
        progress.send_replace(ProgressSnapshot::started(run, intent));
        // Only analysis runs show the stage list
        let simulator = (intent == QueryIntent::Analysis)
            .then(|| ProgressSimulator::start(Arc::clone(progress), run, tick));

        Self {
            progress,
            simulator,
            run,
            intent,
            settled: false,
        }
    }

    fn settle(&mut self) {
        if self.settled {
            return;
        }
        self.settled = true;
        if let Some(simulator) = self.simulator.as_mut() {
            simulator.stop();
        }
        self.progress
            .send_replace(ProgressSnapshot::settled(self.run, self.intent));
    }
}

impl Drop for RunProgress<'_> {
    fn drop(&mut self) {
        self.settle();
    }
}

impl AnalysisOrchestrator {
    pub fn new(backend: Arc<dyn PortfolioBackend>, config: OrchestratorConfig) -> Self {
        let (progress, _) = watch::channel(ProgressSnapshot::idle());
        Self {
            backend,
            config,
            progress: Arc::new(progress),
            in_flight: AtomicBool::new(false),
            runs: AtomicU64::new(0),
        }
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<ProgressSnapshot> {
        self.progress.subscribe()
    }

    pub fn progress(&self) -> ProgressSnapshot {
        *self.progress.borrow()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Run one query to settlement.
    ///
    /// The user turn and a pending assistant turn are appended to `session`
    /// before the request goes out; the pending turn is resolved exactly once
    /// with either the rendered response or an `Error: ...` line (a connect
    /// prompt for `AuthRequired`). Failures are returned as well, after the
    /// transcript has been updated.
    pub async fn run(
        &self,
        session: &mut ConversationSession,
        query: &str,
        holdings: &HoldingsSnapshot,
    ) -> Result<ResponseModel> {
        let _in_flight = InFlightGuard::acquire(&self.in_flight)?;

        let intent = QueryClassifier::classify(query, holdings.holdings());
        let run = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
        let trace_id = Uuid::new_v4();

        info!(
            %trace_id,
            run,
            %intent,
            holdings = holdings.holdings().len(),
            context_hash = %holdings.context_hash,
            "Starting analysis run"
        );

        // History covers turns before this query only
        let conversation_history = self.config.history.summarize(session);

        session.append_user_turn(query);
        let pending = session.append_pending_assistant_turn();

        let mut progress =
            RunProgress::begin(&self.progress, run, intent, self.config.progress_tick);

        let request = AnalyzeRequest {
            query: query.to_string(),
            portfolio_context: holdings.holdings().to_vec(),
            conversation_history,
        };

        let started = Instant::now();
        let outcome = self.backend.analyze(&request).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        progress.settle();

        match outcome {
            Ok(response) => {
                info!(
                    %trace_id,
                    response_type = response.kind(),
                    elapsed_ms,
                    "Analysis run settled"
                );
                session.resolve_or_log(pending, ResponseRenderer::render(&response));
                Ok(response)
            }
            Err(e) => {
                warn!(%trace_id, elapsed_ms, "Analysis run failed: {}", e);
                session.resolve_or_log(pending, ResponseRenderer::render_failure(&e));
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockBackend;
    use crate::memory::MessageRole;
    use crate::models::{AnalysisResult, GeneralChatResult, Holding, HoldingsLookupResult, Recommendation};
    use tokio::time::{advance, sleep};

    fn aapl() -> Holding {
        Holding {
            symbol: "AAPL".to_string(),
            name: "Apple Inc.".to_string(),
            price: 175.0,
            quantity: 10.0,
            value: 1750.0,
            change: 0.8,
            average_buy_price: Some(170.0),
        }
    }

    fn aapl_analysis() -> ResponseModel {
        ResponseModel::Analysis(AnalysisResult {
            ticker: Some("AAPL".to_string()),
            recommendation: Recommendation::Buy,
            confidence: Some("HIGH".to_string()),
            synthesis: "Services growth supports upside.".to_string(),
            risks: vec!["Regulatory pressure".to_string()],
            ..Default::default()
        })
    }

    fn orchestrator(backend: Arc<MockBackend>) -> AnalysisOrchestrator {
        AnalysisOrchestrator::new(backend, OrchestratorConfig::default())
    }

    #[tokio::test]
    async fn test_analysis_query_attaches_structured_result() {
        let backend = Arc::new(MockBackend::new());
        backend.push_analysis(Ok(aapl_analysis()));
        let orchestrator = orchestrator(backend.clone());
        let mut session = ConversationSession::new();

        let response = orchestrator
            .run(&mut session, "Analyze AAPL", &HoldingsSnapshot::empty())
            .await
            .unwrap();

        assert_eq!(response.kind(), "analysis");
        let last = session.last().unwrap();
        assert_eq!(last.role, MessageRole::Assistant);
        assert_eq!(last.structured_result().and_then(|a| a.ticker()), Some("AAPL"));
        assert_eq!(orchestrator.progress().intent, Some(QueryIntent::Analysis));
        assert_eq!(orchestrator.progress().phase, ProgressPhase::Settled);
        assert_eq!(backend.analyze_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_holdings_query_renders_text_only() {
        let backend = Arc::new(MockBackend::new());
        backend.push_analysis(Ok(ResponseModel::HoldingsLookup(HoldingsLookupResult {
            ticker: "AAPL".to_string(),
            company_name: "Apple Inc.".to_string(),
            shares_held: 10.0,
            total_value: 1750.0,
            unrealized_pl_dollars: 50.0,
            unrealized_pl_percent: 2.94,
            current_price: None,
            average_cost: None,
        })));
        let orchestrator = orchestrator(backend.clone());
        let mut session = ConversationSession::new();
        let holdings = HoldingsSnapshot::new(vec![aapl()]);

        orchestrator
            .run(&mut session, "What are my AAPL shares worth", &holdings)
            .await
            .unwrap();

        assert_eq!(orchestrator.progress().intent, Some(QueryIntent::Holdings));
        let last = session.last().unwrap();
        assert!(last.structured_result().is_none());
        let text = last.text().unwrap();
        assert!(text.contains("Shares: 10"));
        assert!(text.contains("2.94%"));

        let requests = backend.requests.lock().unwrap();
        assert_eq!(requests[0].portfolio_context, vec![aapl()]);
    }

    #[tokio::test]
    async fn test_general_query_renders_synthesis() {
        let backend = Arc::new(MockBackend::new());
        backend.push_analysis(Ok(ResponseModel::GeneralChat(GeneralChatResult {
            synthesis: "Hi there".to_string(),
        })));
        let orchestrator = orchestrator(backend);
        let mut session = ConversationSession::new();

        orchestrator
            .run(&mut session, "hello", &HoldingsSnapshot::empty())
            .await
            .unwrap();

        let last = session.last().unwrap();
        assert_eq!(last.text(), Some("Hi there"));
        assert!(last.structured_result().is_none());
        assert_eq!(orchestrator.progress().intent, Some(QueryIntent::General));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_resolves_error_and_stops_progress() {
        let backend = Arc::new(MockBackend::new().with_latency(Duration::from_millis(4000)));
        backend.push_analysis(Err("timeout".to_string()));
        let orchestrator = orchestrator(backend);
        let mut progress = orchestrator.subscribe_progress();
        let mut session = ConversationSession::new();
        let empty = HoldingsSnapshot::empty();

        let (result, mid_run) = tokio::join!(
            orchestrator.run(&mut session, "Analyze AAPL", &empty),
            async {
                sleep(Duration::from_millis(3200)).await;
                *progress.borrow()
            }
        );

        assert!(matches!(result, Err(ChatError::Remote(ref m)) if m == "timeout"));
        assert_eq!(session.last().unwrap().text(), Some("Error: timeout"));
        assert_eq!(mid_run.phase, ProgressPhase::Running);
        assert_eq!(mid_run.stage_index, 2);

        let settled = *progress.borrow_and_update();
        assert_eq!(settled.phase, ProgressPhase::Settled);

        advance(Duration::from_secs(60)).await;
        assert!(!progress.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_auth_required_resolves_connect_prompt() {
        let backend = Arc::new(MockBackend::new());
        backend.push_analysis_result(Err(ChatError::AuthRequired));
        let orchestrator = orchestrator(backend);
        let mut session = ConversationSession::new();
        let empty = HoldingsSnapshot::empty();

        let result = orchestrator.run(&mut session, "Analyze AAPL", &empty).await;

        assert!(matches!(result, Err(ChatError::AuthRequired)));
        let last = session.last().unwrap();
        assert_eq!(last.text(), Some(crate::render::CONNECT_PROMPT));
        assert!(!last.text().unwrap().starts_with("Error:"));
        assert_eq!(orchestrator.progress().phase, ProgressPhase::Settled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_is_monotonic_capped_and_reset_per_run() {
        let backend = Arc::new(MockBackend::new().with_latency(Duration::from_secs(20)));
        backend.push_analysis(Ok(aapl_analysis()));
        backend.push_analysis(Ok(aapl_analysis()));
        let orchestrator = orchestrator(backend);
        let progress = orchestrator.subscribe_progress();
        let mut session = ConversationSession::new();
        let empty = HoldingsSnapshot::empty();

        for expected_run in 1..=2u64 {
            let (result, samples) = tokio::join!(
                orchestrator.run(&mut session, "Analyze AAPL", &empty),
                async {
                    let mut samples = Vec::new();
                    for _ in 0..12 {
                        samples.push(*progress.borrow());
                        sleep(Duration::from_millis(1000)).await;
                    }
                    samples
                }
            );
            result.unwrap();

            assert!(samples.iter().all(|s| s.run == expected_run));
            assert_eq!(samples[0].stage_index, 0);
            assert!(samples.windows(2).all(|w| w[0].stage_index <= w[1].stage_index));
            assert!(samples.iter().all(|s| s.stage_index < STAGES.len()));
            assert_eq!(samples.last().unwrap().stage_index, STAGES.len() - 1);
            assert_eq!(orchestrator.progress().stage_index, STAGES.len());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_analysis_run_never_ticks() {
        let backend = Arc::new(MockBackend::new().with_latency(Duration::from_secs(5)));
        backend.push_analysis(Ok(ResponseModel::GeneralChat(GeneralChatResult {
            synthesis: "Hi".to_string(),
        })));
        let orchestrator = orchestrator(backend);
        let progress = orchestrator.subscribe_progress();
        let mut session = ConversationSession::new();
        let empty = HoldingsSnapshot::empty();

        let (_, mid_run) = tokio::join!(
            orchestrator.run(&mut session, "hello", &empty),
            async {
                sleep(Duration::from_millis(4000)).await;
                *progress.borrow()
            }
        );

        assert_eq!(mid_run.phase, ProgressPhase::Running);
        assert_eq!(mid_run.stage_index, 0);
        assert!(!mid_run.shows_stages());
    }

    #[tokio::test]
    async fn test_history_excludes_current_query_and_summarizes_cards() {
        let backend = Arc::new(MockBackend::new());
        backend.push_analysis(Ok(aapl_analysis()));
        backend.push_analysis(Ok(ResponseModel::GeneralChat(GeneralChatResult {
            synthesis: "You're welcome".to_string(),
        })));
        let orchestrator = orchestrator(backend.clone());
        let mut session = ConversationSession::new();
        let holdings = HoldingsSnapshot::empty();

        orchestrator.run(&mut session, "Analyze AAPL", &holdings).await.unwrap();
        orchestrator.run(&mut session, "thanks", &holdings).await.unwrap();

        let requests = backend.requests.lock().unwrap();
        assert!(requests[0].conversation_history.is_empty());

        let second: Vec<(MessageRole, &str)> = requests[1]
            .conversation_history
            .iter()
            .map(|h| (h.role, h.content.as_str()))
            .collect();
        assert_eq!(
            second,
            vec![
                (MessageRole::User, "Analyze AAPL"),
                (MessageRole::Assistant, "Analysis for AAPL"),
            ]
        );
        assert_eq!(requests[1].query, "thanks");
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_run_while_in_flight_is_rejected() {
        let backend = Arc::new(MockBackend::new().with_latency(Duration::from_secs(2)));
        backend.push_analysis(Ok(aapl_analysis()));
        let orchestrator = orchestrator(backend.clone());
        let mut first = ConversationSession::new();
        let mut second = ConversationSession::new();
        let holdings = HoldingsSnapshot::empty();

        let (a, b) = tokio::join!(
            orchestrator.run(&mut first, "Analyze AAPL", &holdings),
            async {
                tokio::task::yield_now().await;
                orchestrator.run(&mut second, "Analyze MSFT", &holdings).await
            }
        );

        assert!(a.is_ok());
        assert!(matches!(b, Err(ChatError::Busy)));
        assert_eq!(second.message_count(), 0);
        assert_eq!(backend.analyze_calls.load(Ordering::SeqCst), 1);
        assert!(!orchestrator.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_run_stops_progress_and_releases_slot() {
        let backend = Arc::new(MockBackend::new().with_latency(Duration::from_secs(30)));
        backend.push_analysis(Ok(aapl_analysis()));
        let orchestrator = orchestrator(backend);
        let mut progress = orchestrator.subscribe_progress();
        let mut session = ConversationSession::new();
        let empty = HoldingsSnapshot::empty();

        let (timed_out, mid_run) = tokio::join!(
            tokio::time::timeout(
                Duration::from_millis(1600),
                orchestrator.run(&mut session, "Analyze AAPL", &empty),
            ),
            async {
                sleep(Duration::from_millis(1550)).await;
                *progress.borrow()
            }
        );
        assert!(timed_out.is_err());
        assert_eq!(mid_run.stage_index, 1);
        assert!(mid_run.shows_stages());

        // The stage list is taken down with the run
        let after = *progress.borrow_and_update();
        assert_eq!(after.phase, ProgressPhase::Settled);
        assert_eq!(after.run, 1);
        assert!(!after.shows_stages());
        assert!(after.current_stage().is_none());

        advance(Duration::from_secs(60)).await;
        assert!(!progress.has_changed().unwrap());
        assert!(!orchestrator.is_busy());

        // Torn down mid-flight: the reserved slot is still pending
        assert!(session.last().unwrap().is_pending());
        assert!(session.last().unwrap().content().is_none());
    }
}
