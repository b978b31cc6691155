// ==========================================
// 配送派单核心 - 并单引擎
// ==========================================
// 职责: 将目的地相近、时间窗相容、来源相容的运单合并为一趟
// 输入: 待分配运单 + 本周期骑手池 + 并单参数
// 输出: 并单列表 + 未并单运单
// 红线: 并单重量 = 成员重量之和; 时间窗交集为空的运单绝不合并
// ==========================================

use crate::config::ClubbingConfig;
use crate::domain::bundle::{AllocatableUnit, Bundle};
use crate::domain::job::Job;
use crate::domain::window::TimeWindow;
use crate::domain::worker::Worker;
use crate::engine::compatibility::CompatibilityEngine;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use tracing::{debug, instrument};

/// 并单结果
#[derive(Debug, Clone, Default)]
pub struct ClubbingResult {
    pub bundles: Vec<Bundle>,
    pub unbundled: Vec<Job>,
}

impl ClubbingResult {
    /// 转为分配单元（并单在前，单票在后）
    pub fn into_units(self) -> Vec<AllocatableUnit> {
        self.bundles
            .into_iter()
            .map(AllocatableUnit::Bundle)
            .chain(self.unbundled.into_iter().map(AllocatableUnit::Single))
            .collect()
    }
}

/// 组装中的并单
struct BundleDraft {
    members: Vec<Job>,
    window: TimeWindow,
    weight_kg: f64,
    required_tags: BTreeSet<String>,
    sources: BTreeSet<String>,
    exclusions: BTreeSet<String>,
}

impl BundleDraft {
    fn seed(job: Job, now: DateTime<Utc>) -> Self {
        Self {
            window: job.window,
            weight_kg: job.weight_kg,
            required_tags: job.required_tags.clone(),
            sources: BTreeSet::from([job.source.clone()]),
            exclusions: job.active_exclusions(now),
            members: vec![job],
        }
    }

    fn push(&mut self, job: Job, window: TimeWindow, now: DateTime<Utc>) {
        self.window = window;
        self.weight_kg += job.weight_kg;
        self.required_tags.extend(job.required_tags.iter().cloned());
        self.sources.insert(job.source.clone());
        self.exclusions.extend(job.active_exclusions(now));
        self.members.push(job);
    }

    fn into_bundle(self) -> Bundle {
        let hub_id = self.members[0].hub_id.clone();
        Bundle {
            bundle_id: format!("CLUB-{}", self.members[0].job_ref),
            hub_id,
            members: self.members,
            required_tags: self.required_tags,
            window: self.window,
            weight_kg: self.weight_kg,
            sources: self.sources,
        }
    }
}

// ==========================================
// ClubbingEngine - 并单引擎
// ==========================================
pub struct ClubbingEngine;

impl ClubbingEngine {
    /// 执行并单
    ///
    /// # 规则
    /// 1. 未启用 / 带 no-club 标签 / 来源禁止并单 → 原样返回单票
    /// 2. 按入单时间依次尝试加入已有并单（可传递合并），否则自成一组
    /// 3. 加入条件（对组内每个成员）:
    ///    - 同站点、来源相容
    ///    - 目的地距离 <= max_distance_meters
    ///    - open 偏差 <= max_window_skew_seconds，且整组时间窗交集非空
    /// 4. 整组条件: 成员数 <= max_bundle_size，总重 <= 车型载重上限，
    ///    骑手池中至少一名骑手能承接标签并集、未被任何成员排除、载重足够
    /// 5. 只有一个成员的组退回单票
    #[instrument(skip_all, fields(jobs_count = jobs.len(), workers_count = workers.len()))]
    pub fn club(
        jobs: Vec<Job>,
        workers: &[Worker],
        config: &ClubbingConfig,
        now: DateTime<Utc>,
    ) -> ClubbingResult {
        if !config.enabled {
            return ClubbingResult {
                bundles: Vec::new(),
                unbundled: jobs,
            };
        }

        let ceiling = config.max_vehicle_capacity_kg.or_else(|| {
            workers
                .iter()
                .map(|w| w.max_weight_kg)
                .filter(|w| w.is_finite())
                .reduce(f64::max)
        });

        let mut ordered = jobs;
        ordered.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.job_ref.cmp(&b.job_ref)));

        let mut drafts: Vec<BundleDraft> = Vec::new();
        let mut never_clubbed: Vec<Job> = Vec::new();

        for job in ordered {
            if !Self::is_clubbable(&job, config) {
                never_clubbed.push(job);
                continue;
            }

            let target = drafts.iter().enumerate().find_map(|(i, draft)| {
                Self::join_window(draft, &job, workers, config, ceiling, now).map(|w| (i, w))
            });

            match target {
                Some((i, window)) => {
                    debug!(job_ref = %job.job_ref, seed = %drafts[i].members[0].job_ref, "运单加入并单");
                    drafts[i].push(job, window, now);
                }
                None => drafts.push(BundleDraft::seed(job, now)),
            }
        }

        let mut result = ClubbingResult::default();
        for draft in drafts {
            if draft.members.len() >= 2 {
                result.bundles.push(draft.into_bundle());
            } else {
                result.unbundled.extend(draft.members);
            }
        }
        result.unbundled.extend(never_clubbed);

        debug!(
            bundles_count = result.bundles.len(),
            unbundled_count = result.unbundled.len(),
            "并单完成"
        );
        result
    }

    /// 运单本身是否允许并单
    pub fn is_clubbable(job: &Job, config: &ClubbingConfig) -> bool {
        job.is_clubbable()
            && !config.non_clubbable_sources.contains(&job.source)
            && job.validate().is_ok()
    }

    /// 判断 job 能否加入 draft；可加入时返回新的交集时间窗
    fn join_window(
        draft: &BundleDraft,
        job: &Job,
        workers: &[Worker],
        config: &ClubbingConfig,
        ceiling: Option<f64>,
        now: DateTime<Utc>,
    ) -> Option<TimeWindow> {
        if draft.members.len() >= config.max_bundle_size {
            return None;
        }

        // 同站点 + 来源相容
        if draft.members[0].hub_id != job.hub_id {
            return None;
        }
        if !config.allow_cross_source && !draft.sources.contains(&job.source) {
            return None;
        }

        // 目的地距离 + open 偏差（对每个成员）
        let near_all = draft.members.iter().all(|m| {
            m.destination.distance_m(&job.destination) <= config.max_distance_meters
                && m.window.open_skew_secs(&job.window) <= config.max_window_skew_seconds
        });
        if !near_all {
            return None;
        }

        // 时间窗交集必须非空
        let window = draft.window.intersect(&job.window)?;

        // 载重上限
        let combined_weight = draft.weight_kg + job.weight_kg;
        if !combined_weight.is_finite() {
            return None;
        }
        if let Some(ceiling) = ceiling {
            if combined_weight > ceiling {
                return None;
            }
        }

        // 骑手池可行性: 至少一名骑手能整单承接
        if !workers.is_empty() {
            let mut tags = draft.required_tags.clone();
            tags.extend(job.required_tags.iter().cloned());
            let mut exclusions = draft.exclusions.clone();
            exclusions.extend(job.active_exclusions(now));
            let count = draft.members.len() as u32 + 1;

            let feasible = workers.iter().any(|w| {
                CompatibilityEngine::is_compatible(&w.capabilities, &tags, &exclusions, &w.id)
                    && w.max_weight_kg >= combined_weight
                    && w.max_jobs >= count
            });
            if !feasible {
                return None;
            }
        }

        Some(window)
    }
}
