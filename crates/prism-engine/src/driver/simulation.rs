//! Local simulation driver.
//!
//! Plays each platform's fixed step list with randomized delays, one future per
//! platform joined on the driver task. Always ends in success: this is the demo
//! path, not a fault injector.

use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use prism_core::{AdaptedContent, ContentAdapter, DriverMode, Engagement, Platform, PlatformResult, PublishEvent};
use prism_settings::SimulationSettings;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::debug;

use super::{Driver, DriverPlan, EventSink};
use crate::error::DriverError;

const THOUGHTS: &[&str] = &[
    "The composer is open, checking the text landed where expected",
    "Layout differs from the last run, looking for the post button again",
    "Content length is within limits, no need to trim",
    "Hashtags render as links, formatting looks right",
    "A cookie banner is covering part of the page, dismissing it first",
];

const ACTIONS: &[&str] = &[
    "Scrolling to the composer",
    "Pasting adapted content",
    "Waiting for the editor to settle",
    "Hovering over the publish button",
    "Closing an overlay",
];

#[derive(Clone, Debug)]
pub struct SimulationConfig {
    pub min_step_delay: Duration,
    pub max_step_delay: Duration,
    /// Offset between consecutive platforms' start.
    pub stagger: Duration,
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self::from(&SimulationSettings::default())
    }
}

impl From<&SimulationSettings> for SimulationConfig {
    fn from(s: &SimulationSettings) -> Self {
        Self {
            min_step_delay: Duration::from_millis(s.min_step_delay_ms),
            max_step_delay: Duration::from_millis(s.max_step_delay_ms),
            stagger: Duration::from_millis(s.stagger_ms),
            seed: s.seed,
        }
    }
}

impl SimulationConfig {
    /// Upper bound on the wall-clock time of a full run over `platforms`.
    pub fn time_bound(&self, platforms: &[Platform]) -> Duration {
        let max_steps = platforms.iter().map(|p| p.steps().len()).max().unwrap_or(0);
        let stagger = self.stagger * platforms.len().saturating_sub(1) as u32;
        stagger + self.max_step_delay * max_steps as u32
    }

    fn rng_for(&self, index: usize) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(index as u64)),
            None => StdRng::from_entropy(),
        }
    }

    fn step_delay(&self, rng: &mut StdRng) -> Duration {
        if self.max_step_delay <= self.min_step_delay {
            return self.min_step_delay;
        }
        rng.gen_range(self.min_step_delay..=self.max_step_delay)
    }
}

#[derive(Clone, Debug, Default)]
pub struct SimulationDriver {
    config: SimulationConfig,
}

impl SimulationDriver {
    pub fn new(config: SimulationConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Driver for SimulationDriver {
    fn mode(&self) -> DriverMode {
        DriverMode::LocalSimulation
    }

    async fn run(self: Box<Self>, plan: DriverPlan, sink: EventSink) -> Result<(), DriverError> {
        let adapter = ContentAdapter;
        let runs = plan.platforms.iter().enumerate().map(|(index, platform)| {
            let adapted = adapter.adapt(&plan.content, *platform);
            play_platform(index, adapted, &self.config, &sink)
        });
        let results: Option<Vec<PlatformResult>> = join_all(runs).await.into_iter().collect();
        let Some(results) = results else {
            debug!(session_id = %plan.session_id, "simulation cancelled");
            return Err(DriverError::Cancelled);
        };

        let message = format!(
            "Successfully published to {0}/{0} platforms",
            results.len()
        );
        let summary = PublishEvent::AllPlatformsCompleted {
            results,
            message: Some(message),
        };
        if !sink.emit(summary).await {
            return Err(DriverError::Cancelled);
        }
        debug!(session_id = %plan.session_id, "simulation finished");
        Ok(())
    }
}

/// Play one platform. `None` when the session stopped listening.
async fn play_platform(
    index: usize,
    adapted: AdaptedContent,
    config: &SimulationConfig,
    sink: &EventSink,
) -> Option<PlatformResult> {
    let platform = adapted.platform;
    let mut rng = config.rng_for(index);

    if index > 0 && !sink.sleep(config.stagger * index as u32).await {
        return None;
    }
    if !sink.emit(PublishEvent::started(platform)).await {
        return None;
    }

    let steps = platform.steps();
    let total = steps.len() as u32;
    let flavor_at = total.div_ceil(2);
    let mut elapsed = Duration::ZERO;

    for (i, description) in steps.iter().enumerate() {
        let step = i as u32 + 1;
        let delay = config.step_delay(&mut rng);
        elapsed += delay;
        if !sink.sleep(delay).await {
            return None;
        }
        if !sink.emit(PublishEvent::step(platform, step, total, *description)).await {
            return None;
        }
        if step == flavor_at {
            let thinking = PublishEvent::AgentThinking {
                platform: Some(platform.as_str().to_owned()),
                thinking: pick(THOUGHTS, &mut rng),
            };
            let action = PublishEvent::AgentAction {
                platform: platform.as_str().to_owned(),
                action: pick(ACTIONS, &mut rng),
            };
            if !sink.emit(thinking).await || !sink.emit(action).await {
                return None;
            }
        }
    }

    let result = synthesize(adapted, total, &mut rng);
    debug!(platform = platform.as_str(), simulated_secs = elapsed.as_secs_f64(), "simulated platform done");
    if !sink.emit(PublishEvent::completed(platform, Some(result.clone()))).await {
        return None;
    }
    Some(result)
}

fn pick(pool: &[&str], rng: &mut StdRng) -> String {
    pool.choose(rng).copied().unwrap_or_default().to_owned()
}

/// A plausible success result: synthetic post URL, execution time in 15-45 s,
/// likes 10-500, comments 0-60, shares 0-40 where the platform has them.
fn synthesize(adapted: AdaptedContent, step_count: u32, rng: &mut StdRng) -> PlatformResult {
    let platform = adapted.platform;
    let url = match platform {
        Platform::LinkedIn => format!(
            "https://www.linkedin.com/feed/update/urn:li:activity:{}/",
            rng.gen_range(7_000_000_000_000_000_000u64..7_400_000_000_000_000_000)
        ),
        Platform::Twitter => format!(
            "https://x.com/i/status/{}",
            rng.gen_range(1_800_000_000_000_000_000u64..1_900_000_000_000_000_000)
        ),
        Platform::Instagram => format!("https://www.instagram.com/p/{}/", shortcode(rng)),
    };

    let mut result = PlatformResult::success(platform, adapted.text, url);
    result.hashtags = adapted.hashtags;
    result.insight = format!(
        "Adapted for {} with a {} tone and {} hashtag(s)",
        platform.display_name(),
        adapted.tone,
        result.hashtags.len()
    );
    result.step_count = step_count;
    result.execution_time_secs = Some((rng.gen_range(15.0..45.0_f64) * 10.0).round() / 10.0);
    result.engagement = Some(Engagement {
        likes: Some(rng.gen_range(10..=500)),
        comments: Some(rng.gen_range(0..=60)),
        shares: platform.reports_shares().then(|| rng.gen_range(0..=40)),
    });
    result
}

fn shortcode(rng: &mut StdRng) -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";
    (0..11)
        .map(|_| char::from(ALPHABET[rng.gen_range(0..ALPHABET.len())]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_core::SessionId;
    use tokio::time::Instant;
    use tokio_util::sync::CancellationToken;

    fn plan(platforms: &[Platform]) -> DriverPlan {
        DriverPlan {
            session_id: SessionId::new(),
            content: "Hello world".into(),
            platforms: platforms.to_vec(),
        }
    }

    fn seeded() -> SimulationConfig {
        SimulationConfig {
            seed: Some(7),
            ..SimulationConfig::default()
        }
    }

    async fn collect(mut rx: tokio::sync::mpsc::Receiver<PublishEvent>) -> Vec<PublishEvent> {
        let mut events = Vec::new();
        while let Some(e) = rx.recv().await {
            events.push(e);
        }
        events
    }

    #[tokio::test(start_paused = true)]
    async fn emits_per_platform_sequence_then_summary() {
        let platforms = [Platform::LinkedIn, Platform::Instagram];
        let (sink, rx) = EventSink::channel(512, CancellationToken::new());
        let driver = Box::new(SimulationDriver::new(seeded()));
        let run = tokio::spawn(driver.run(plan(&platforms), sink));
        let events = collect(rx).await;
        run.await.unwrap().unwrap();

        for platform in platforms {
            let own: Vec<&PublishEvent> = events
                .iter()
                .filter(|e| e.target() == Some(platform.as_str()))
                .collect();
            assert_eq!(own.first().map(|e| e.event_type()), Some("platform_started"));
            assert_eq!(own.last().map(|e| e.event_type()), Some("platform_completed"));
            let steps: Vec<u32> = own
                .iter()
                .filter_map(|e| match e {
                    PublishEvent::AgentStep { step, .. } => Some(*step),
                    _ => None,
                })
                .collect();
            let expected: Vec<u32> = (1..=platform.steps().len() as u32).collect();
            assert_eq!(steps, expected);
        }

        let thinking = events.iter().filter(|e| e.event_type() == "agent_thinking").count();
        assert_eq!(thinking, platforms.len());
        match events.last() {
            Some(PublishEvent::AllPlatformsCompleted { results, .. }) => {
                assert_eq!(results.len(), 2);
                assert!(results.iter().all(PlatformResult::is_success));
            }
            other => panic!("expected summary last, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn finishes_within_time_bound() {
        let config = seeded();
        let bound = config.time_bound(&Platform::ALL);
        let (sink, rx) = EventSink::channel(512, CancellationToken::new());
        let started = Instant::now();
        let run = tokio::spawn(Box::new(SimulationDriver::new(config)).run(plan(&Platform::ALL), sink));
        let events = collect(rx).await;
        run.await.unwrap().unwrap();
        assert!(started.elapsed() <= bound, "{:?} > {:?}", started.elapsed(), bound);
        assert_eq!(events.last().map(|e| e.event_type()), Some("all_platforms_completed"));
    }

    #[tokio::test(start_paused = true)]
    async fn stops_emitting_once_cancelled() {
        let cancel = CancellationToken::new();
        let (sink, mut rx) = EventSink::channel(512, cancel.clone());
        let run = tokio::spawn(Box::new(SimulationDriver::new(seeded())).run(plan(&[Platform::Twitter]), sink));

        assert_eq!(rx.recv().await.map(|e| e.event_type()), Some("platform_started"));
        cancel.cancel();
        let result = run.await.unwrap();
        assert!(matches!(result, Err(DriverError::Cancelled)));
        while let Ok(e) = rx.try_recv() {
            assert_ne!(e.event_type(), "all_platforms_completed");
        }
    }

    #[test]
    fn synthesized_result_is_platform_shaped() {
        let mut rng = StdRng::seed_from_u64(1);
        let adapted = ContentAdapter.adapt("Hello world", Platform::Instagram);
        let result = synthesize(adapted, 8, &mut rng);
        let url = result.external_url.as_deref().unwrap();
        assert!(url.starts_with("https://www.instagram.com/p/"));
        assert_eq!(url.trim_start_matches("https://www.instagram.com/p/").trim_end_matches('/').len(), 11);
        assert_eq!(result.step_count, 8);
        assert_eq!(result.error_count, 0);
        let secs = result.execution_time_secs.unwrap();
        assert!((15.0..=45.0).contains(&secs));
        let engagement = result.engagement.unwrap();
        assert!(engagement.shares.is_none());
        assert!((10..=500).contains(&engagement.likes.unwrap()));
    }

    #[test]
    fn same_seed_same_delays() {
        let config = seeded();
        let a: Vec<Duration> = {
            let mut rng = config.rng_for(0);
            (0..5).map(|_| config.step_delay(&mut rng)).collect()
        };
        let b: Vec<Duration> = {
            let mut rng = config.rng_for(0);
            (0..5).map(|_| config.step_delay(&mut rng)).collect()
        };
        assert_eq!(a, b);
        assert!(a.iter().all(|d| *d >= config.min_step_delay && *d <= config.max_step_delay));
    }
}
