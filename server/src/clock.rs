//! World clock scheduler
//!
//! A single task wakes up every tick interval (scaled by the clock's
//! `time_scale`), advances world time, persists it and pushes a `time_update`
//! to every connected client. Day, season and hour boundaries run hooks.

use crate::error::StoreError;
use crate::hub::HubHandle;
use crate::world::{NpcPosition, WorldStore, MAX_GROWTH_STAGE};
use log::{debug, error, info, warn};
use shared::{GameClock, Rollover, ServerEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Callbacks fired on clock boundaries
///
/// Hooks receive the clock as it is after the tick. `on_hourly` runs on the
/// blocking pool and is not awaited by the tick.
pub trait ClockHooks: Send + Sync {
    fn on_daily(&self, _clock: &GameClock) {}

    fn on_season(&self, _clock: &GameClock) {}

    fn on_hourly(&self, _clock: &GameClock) {}
}

/// Hooks that move NPCs along their schedules and grow planted objects
pub struct WorldHooks {
    store: Arc<dyn WorldStore>,
    hub: HubHandle,
}

impl WorldHooks {
    pub fn new(store: Arc<dyn WorldStore>, hub: HubHandle) -> Self {
        Self { store, hub }
    }

    fn move_npcs(&self, hour: u8) -> Result<usize, StoreError> {
        let schedules = self.store.npc_schedules_at(hour)?;
        let mut moved = 0;

        for schedule in schedules {
            let position = NpcPosition {
                npc_id: schedule.npc_id,
                map_id: schedule.map_id,
                pos_x: schedule.pos_x,
                pos_y: schedule.pos_y,
                direction: schedule.direction,
            };

            if let Err(e) = self.store.set_npc_position(&position) {
                warn!("Failed to move NPC {}: {}", schedule.npc_id, e);
                continue;
            }

            debug!("NPC {} -> {}", schedule.npc_id, schedule.action);
            self.hub.broadcast_to_map(
                position.map_id,
                &ServerEvent::NpcPositionUpdate {
                    npc_id: position.npc_id,
                    map_id: position.map_id,
                    pos_x: position.pos_x,
                    pos_y: position.pos_y,
                    direction: position.direction,
                },
            );
            moved += 1;
        }

        Ok(moved)
    }

    fn grow_objects(&self) -> Result<usize, StoreError> {
        let mut grown = 0;

        for mut object in self.store.growing_objects()? {
            let stage = object.state.growth_stage.unwrap_or(0);
            object.state.growth_stage = Some((stage + 1).min(MAX_GROWTH_STAGE));

            if let Err(e) = self.store.update_object(&object) {
                warn!("Failed to grow object {}: {}", object.id, e);
                continue;
            }

            self.hub.broadcast_to_map(
                object.map_id,
                &ServerEvent::WorldObjectUpdate {
                    object_id: object.id,
                    pos_x: object.pos_x,
                    pos_y: object.pos_y,
                    state: object.state.clone(),
                },
            );
            grown += 1;
        }

        Ok(grown)
    }
}

impl ClockHooks for WorldHooks {
    fn on_daily(&self, clock: &GameClock) {
        info!(
            "New day: year {} {} day {}",
            clock.year, clock.season, clock.day
        );
    }

    fn on_season(&self, clock: &GameClock) {
        info!("Season changed to {} (year {})", clock.season, clock.year);
    }

    fn on_hourly(&self, clock: &GameClock) {
        match self.move_npcs(clock.hour) {
            Ok(0) => {}
            Ok(moved) => debug!("Moved {} NPCs at {:02}:00", moved, clock.hour),
            Err(e) => warn!("NPC schedule lookup failed: {}", e),
        }

        match self.grow_objects() {
            Ok(0) => {}
            Ok(grown) => debug!("Advanced growth of {} objects", grown),
            Err(e) => warn!("Growth lookup failed: {}", e),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Paused,
    Advanced { clock: GameClock, rollover: Rollover },
}

pub struct ClockScheduler {
    store: Arc<dyn WorldStore>,
    hub: HubHandle,
    hooks: Arc<dyn ClockHooks>,
    interval: Duration,
    increment: u8,
}

impl ClockScheduler {
    pub fn new(
        store: Arc<dyn WorldStore>,
        hub: HubHandle,
        hooks: Arc<dyn ClockHooks>,
        interval: Duration,
        increment: u8,
    ) -> Self {
        Self {
            store,
            hub,
            hooks,
            interval,
            increment,
        }
    }

    /// Runs one tick: advance, fire day/season hooks, persist, broadcast,
    /// then hand the hourly hook to the blocking pool
    pub fn tick(&self) -> Result<TickOutcome, StoreError> {
        let mut clock = self.store.clock()?;
        if clock.paused {
            return Ok(TickOutcome::Paused);
        }

        let rollover = clock.advance(self.increment);

        if rollover.day {
            self.hooks.on_daily(&clock);
        }
        if rollover.season {
            self.hooks.on_season(&clock);
        }

        self.store.set_clock(&clock)?;

        if rollover.season {
            self.hub.send_to_all(&ServerEvent::SeasonChange {
                new_season: clock.season,
                game_year: clock.year,
            });
        }
        self.hub.send_to_all(&ServerEvent::time_update(&clock));

        if clock.is_on_the_hour() {
            let hooks = Arc::clone(&self.hooks);
            let snapshot = clock.clone();
            tokio::task::spawn_blocking(move || hooks.on_hourly(&snapshot));
        }

        Ok(TickOutcome::Advanced { clock, rollover })
    }

    pub fn start(self) -> SchedulerHandle {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(self.run(cancel.clone()));
        SchedulerHandle {
            cancel,
            task: Some(task),
        }
    }

    async fn run(self, cancel: CancellationToken) {
        info!(
            "Clock scheduler started: +{} minutes every {:?}",
            self.increment, self.interval
        );

        loop {
            let period = match self.store.clock() {
                Ok(clock) => clock.tick_period(self.interval),
                Err(_) => self.interval,
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = sleep(period) => {}
            }

            if let Err(e) = self.tick() {
                error!("Clock tick skipped: {}", e);
            }
        }

        info!("Clock scheduler stopped");
    }
}

/// Owner's side of a running scheduler
#[derive(Debug)]
pub struct SchedulerHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Stops the timer and waits for the task to exit; later calls do nothing
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("Clock scheduler task failed: {}", e);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().map_or(false, |task| !task.is_finished())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{Connection, Frame};
    use crate::hub::Hub;
    use crate::memory::InMemoryWorld;
    use crate::world::{NpcSchedule, ObjectKind, WorldObject};
    use shared::{Direction, NpcId, PlayerId, Season};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc::Receiver;

    #[derive(Default)]
    struct Counting {
        daily: AtomicUsize,
        season: AtomicUsize,
        hourly: AtomicUsize,
    }

    impl ClockHooks for Counting {
        fn on_daily(&self, _clock: &GameClock) {
            self.daily.fetch_add(1, Ordering::SeqCst);
        }

        fn on_season(&self, _clock: &GameClock) {
            self.season.fetch_add(1, Ordering::SeqCst);
        }

        fn on_hourly(&self, _clock: &GameClock) {
            self.hourly.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Fixture {
        store: Arc<InMemoryWorld>,
        hub: HubHandle,
        hooks: Arc<Counting>,
        scheduler: ClockScheduler,
    }

    fn fixture(interval: Duration) -> Fixture {
        let (hub, handle, _queues) = Hub::new(8);
        hub.spawn();
        let store = Arc::new(InMemoryWorld::new());
        let hooks = Arc::new(Counting::default());
        let scheduler = ClockScheduler::new(
            store.clone(),
            handle.clone(),
            hooks.clone(),
            interval,
            10,
        );
        Fixture {
            store,
            hub: handle,
            hooks,
            scheduler,
        }
    }

    async fn listen(hub: &HubHandle, capacity: usize) -> (Connection, Receiver<Frame>) {
        let (connection, rx) = Connection::new(1, PlayerId::new_v4(), capacity);
        hub.register(connection.clone());
        hub.online_players().await;
        (connection, rx)
    }

    fn kinds(rx: &mut Receiver<Frame>) -> Vec<&'static str> {
        let mut kinds = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            kinds.push(ServerEvent::decode(&frame).unwrap().kind());
        }
        kinds
    }

    #[tokio::test]
    async fn test_full_day_of_ticks() {
        let f = fixture(Duration::from_secs(10));

        for _ in 0..144 {
            f.scheduler.tick().unwrap();
        }

        let clock = f.store.clock().unwrap();
        assert_eq!((clock.day, clock.hour, clock.minute), (2, 6, 0));
        assert_eq!(clock.season, Season::Spring);
        assert_eq!(f.hooks.daily.load(Ordering::SeqCst), 1);
        assert_eq!(f.hooks.season.load(Ordering::SeqCst), 0);
    }

    async fn wait_for_hourly(hooks: &Counting, expected: usize) -> usize {
        for _ in 0..200 {
            if hooks.hourly.load(Ordering::SeqCst) >= expected {
                break;
            }
            sleep(Duration::from_millis(5)).await;
        }
        hooks.hourly.load(Ordering::SeqCst)
    }

    #[tokio::test]
    async fn test_hourly_hook_fires_on_the_hour_only() {
        let f = fixture(Duration::from_secs(10));

        // 06:00 -> 06:10
        f.scheduler.tick().unwrap();
        sleep(Duration::from_millis(50)).await;
        assert_eq!(f.hooks.hourly.load(Ordering::SeqCst), 0);

        for _ in 1..144 {
            f.scheduler.tick().unwrap();
        }

        assert_eq!(wait_for_hourly(&f.hooks, 24).await, 24);
        sleep(Duration::from_millis(50)).await;
        assert_eq!(f.hooks.hourly.load(Ordering::SeqCst), 24);
    }

    #[tokio::test]
    async fn test_scheduler_survives_extreme_time_scales() {
        for time_scale in [1e-30, 1e30] {
            let f = fixture(Duration::from_millis(10));
            f.store
                .set_clock(&GameClock {
                    time_scale,
                    ..GameClock::default()
                })
                .unwrap();

            let mut handle = f.scheduler.start();
            sleep(Duration::from_millis(50)).await;
            assert!(handle.is_running());
            handle.stop().await;
            assert!(!handle.is_running());
        }
    }

    #[tokio::test]
    async fn test_tick_broadcasts_time_update() {
        let f = fixture(Duration::from_secs(10));
        let (_connection, mut rx) = listen(&f.hub, 8).await;

        let outcome = f.scheduler.tick().unwrap();
        f.hub.online_players().await;

        match outcome {
            TickOutcome::Advanced { clock, rollover } => {
                assert_eq!((clock.hour, clock.minute), (6, 10));
                assert_eq!(rollover, Rollover::default());
            }
            TickOutcome::Paused => panic!("clock should not be paused"),
        }
        assert_eq!(kinds(&mut rx), vec!["time_update"]);
    }

    #[tokio::test]
    async fn test_paused_clock_does_not_advance() {
        let f = fixture(Duration::from_secs(10));
        let (_connection, mut rx) = listen(&f.hub, 8).await;

        let mut clock = f.store.clock().unwrap();
        clock.paused = true;
        f.store.set_clock(&clock).unwrap();

        assert_eq!(f.scheduler.tick().unwrap(), TickOutcome::Paused);
        f.hub.online_players().await;

        assert_eq!(f.store.clock().unwrap(), clock);
        assert!(kinds(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_end_of_winter_turns_the_year() {
        let f = fixture(Duration::from_secs(10));
        let (_connection, mut rx) = listen(&f.hub, 8).await;

        f.store
            .set_clock(&GameClock {
                year: 3,
                season: Season::Winter,
                day: 28,
                hour: 23,
                minute: 50,
                ..GameClock::default()
            })
            .unwrap();

        f.scheduler.tick().unwrap();
        f.hub.online_players().await;

        let clock = f.store.clock().unwrap();
        assert_eq!(clock.year, 4);
        assert_eq!(clock.season, Season::Spring);
        assert_eq!((clock.day, clock.hour, clock.minute), (1, 0, 0));
        assert_eq!(f.hooks.daily.load(Ordering::SeqCst), 1);
        assert_eq!(f.hooks.season.load(Ordering::SeqCst), 1);
        assert_eq!(kinds(&mut rx), vec!["season_change", "time_update"]);
    }

    #[tokio::test]
    async fn test_scheduler_start_and_stop() {
        let f = fixture(Duration::from_millis(10));
        let store = f.store.clone();
        let start = store.clock().unwrap().total_minutes();

        let mut handle = f.scheduler.start();
        assert!(handle.is_running());
        sleep(Duration::from_millis(150)).await;

        handle.stop().await;
        handle.stop().await;
        assert!(!handle.is_running());

        let stopped_at = store.clock().unwrap().total_minutes();
        assert!(stopped_at > start);
        assert_eq!((stopped_at - start) % 10, 0);

        sleep(Duration::from_millis(50)).await;
        assert_eq!(store.clock().unwrap().total_minutes(), stopped_at);
    }

    #[tokio::test]
    async fn test_world_hooks_move_npcs_and_grow_objects() {
        let (hub, handle, _queues) = Hub::new(8);
        hub.spawn();
        let store = Arc::new(InMemoryWorld::new());
        let map = store.add_map("village", 10, 10).unwrap();

        let npc = NpcId::new_v4();
        store
            .add_schedule(NpcSchedule {
                npc_id: npc,
                hour: 9,
                map_id: map,
                pos_x: 2,
                pos_y: 3,
                direction: Direction::Up,
                action: "patrol".to_string(),
            })
            .unwrap();

        let mut sprout = WorldObject::new(map, ObjectKind::CodeBlock, 1, 1);
        sprout.state.growth_stage = Some(MAX_GROWTH_STAGE - 1);
        let sprout_id = store.add_object(sprout).unwrap();

        let (viewer, mut rx) = listen(&handle, 8).await;
        handle.join_map(viewer.player_id(), map);

        let hooks = WorldHooks::new(store.clone(), handle.clone());
        let clock = GameClock {
            hour: 9,
            ..GameClock::default()
        };
        hooks.on_hourly(&clock);
        handle.online_players().await;

        let npc_at = store.npc_position(npc).unwrap().unwrap();
        assert_eq!((npc_at.pos_x, npc_at.pos_y), (2, 3));
        assert_eq!(
            store.object(sprout_id).unwrap().state.growth_stage,
            Some(MAX_GROWTH_STAGE)
        );
        assert_eq!(
            kinds(&mut rx),
            vec!["npc_position_update", "world_object_update"]
        );

        // Fully grown objects stay put
        hooks.on_hourly(&clock);
        assert_eq!(
            store.object(sprout_id).unwrap().state.growth_stage,
            Some(MAX_GROWTH_STAGE)
        );
    }
}
