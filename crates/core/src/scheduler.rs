use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

pub const DEFAULT_PERIOD: Duration = Duration::from_secs(3600);
pub const NEVER: i64 = -1;
/// 周期上限，更大的值按上限处理
pub const MAX_PERIOD: Duration = Duration::from_secs(365 * 24 * 3600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateInterval {
    Never,
    /// 0 秒，按默认周期处理
    Default,
    Every(Duration),
}

impl UpdateInterval {
    pub fn from_seconds(seconds: i64) -> Self {
        match seconds {
            s if s < 0 => UpdateInterval::Never,
            0 => UpdateInterval::Default,
            s => UpdateInterval::Every(Duration::from_secs((s as u64).min(MAX_PERIOD.as_secs()))),
        }
    }

    /// 写回配置的值：0 替换为默认周期，超过上限的截断，其余不变
    pub fn normalize(seconds: i64) -> i64 {
        match Self::from_seconds(seconds) {
            UpdateInterval::Default => DEFAULT_PERIOD.as_secs() as i64,
            UpdateInterval::Every(period) => period.as_secs() as i64,
            UpdateInterval::Never => seconds,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Armed(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodChange {
    pub state: SchedulerState,
    /// 需要写回配置的秒数
    pub persist: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick;

/// 同一时刻最多只有一个定时器
pub struct Scheduler {
    ticks: mpsc::Sender<Tick>,
    timer: Option<JoinHandle<()>>,
    state: SchedulerState,
}

impl Scheduler {
    pub fn new(ticks: mpsc::Sender<Tick>) -> Self {
        Self {
            ticks,
            timer: None,
            state: SchedulerState::Idle,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn set_period(&mut self, seconds: i64) -> PeriodChange {
        match UpdateInterval::from_seconds(seconds) {
            UpdateInterval::Never => {
                self.cancel();
                info!("定时检查已关闭");
                PeriodChange {
                    state: self.state,
                    persist: None,
                }
            }
            UpdateInterval::Default => {
                self.arm(DEFAULT_PERIOD);
                PeriodChange {
                    state: self.state,
                    persist: Some(DEFAULT_PERIOD.as_secs() as i64),
                }
            }
            UpdateInterval::Every(period) => {
                let clamped = period.as_secs() as i64;
                if clamped != seconds {
                    warn!("更新周期 {} 秒超过上限，改用 {} 秒", seconds, clamped);
                }
                self.arm(period);
                PeriodChange {
                    state: self.state,
                    persist: (clamped != seconds).then_some(clamped),
                }
            }
        }
    }

    pub fn cancel(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
            debug!("已取消定时器");
        }
        self.state = SchedulerState::Idle;
    }

    fn arm(&mut self, period: Duration) {
        self.cancel();

        let ticks = self.ticks.clone();
        self.timer = Some(tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if ticks.send(Tick).await.is_err() {
                    break;
                }
            }
        }));
        self.state = SchedulerState::Armed(period);
        info!("定时检查周期: {} 秒", period.as_secs());
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(rx: &mut mpsc::Receiver<Tick>) -> usize {
        let mut count = 0;
        while rx.try_recv().is_ok() {
            count += 1;
        }
        count
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_coerces_to_default() {
        let (tx, _rx) = mpsc::channel(8);
        let mut scheduler = Scheduler::new(tx);

        let change = scheduler.set_period(0);
        assert_eq!(change.persist, Some(3600));
        assert_eq!(change.state, SchedulerState::Armed(DEFAULT_PERIOD));
        assert_eq!(scheduler.state(), SchedulerState::Armed(DEFAULT_PERIOD));
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_cancels_timer() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut scheduler = Scheduler::new(tx);

        scheduler.set_period(5);
        let change = scheduler.set_period(NEVER);
        assert_eq!(change.state, SchedulerState::Idle);
        assert_eq!(change.persist, None);

        time::sleep(Duration::from_secs(20)).await;
        assert_eq!(drain(&mut rx), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_keeps_single_timer() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut scheduler = Scheduler::new(tx);

        scheduler.set_period(10);
        scheduler.set_period(10);

        time::sleep(Duration::from_secs(25)).await;
        assert_eq!(drain(&mut rx), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_replaces_period() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut scheduler = Scheduler::new(tx);

        scheduler.set_period(3);
        scheduler.set_period(10);
        assert_eq!(scheduler.state(), SchedulerState::Armed(Duration::from_secs(10)));

        time::sleep(Duration::from_secs(11)).await;
        assert_eq!(drain(&mut rx), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_period_is_clamped() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut scheduler = Scheduler::new(tx);

        let change = scheduler.set_period(i64::MAX);
        assert_eq!(change.state, SchedulerState::Armed(MAX_PERIOD));
        assert_eq!(change.persist, Some(MAX_PERIOD.as_secs() as i64));

        time::sleep(MAX_PERIOD + Duration::from_secs(1)).await;
        assert_eq!(drain(&mut rx), 1);
        assert!(scheduler.timer.as_ref().is_some_and(|timer| !timer.is_finished()));
    }

    #[test]
    fn test_interval_from_seconds() {
        assert_eq!(UpdateInterval::from_seconds(-1), UpdateInterval::Never);
        assert_eq!(UpdateInterval::from_seconds(-30), UpdateInterval::Never);
        assert_eq!(UpdateInterval::from_seconds(0), UpdateInterval::Default);
        assert_eq!(
            UpdateInterval::from_seconds(60),
            UpdateInterval::Every(Duration::from_secs(60))
        );
        assert_eq!(UpdateInterval::normalize(0), 3600);
        assert_eq!(UpdateInterval::normalize(-1), -1);
        assert_eq!(UpdateInterval::normalize(900), 900);
        assert_eq!(
            UpdateInterval::from_seconds(i64::MAX),
            UpdateInterval::Every(MAX_PERIOD)
        );
        assert_eq!(UpdateInterval::normalize(i64::MAX), MAX_PERIOD.as_secs() as i64);
    }
}
