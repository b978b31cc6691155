// ==========================================
// 排序键 → 比较器 注册表
// ==========================================
// 红线: 每个比较器都是全序; 缺失字段排在有值之后,未知键视为相等

use super::{CriterionKey, RankingContext};
use crate::domain::worker::{CapacityConstraint, Worker};
use std::cmp::Ordering;

pub(super) type Comparator = fn(&Worker, &Worker, &RankingContext<'_>) -> Ordering;

/// 查找排序键对应的比较器；未知键返回 None
pub(super) fn comparator_for(key: &CriterionKey) -> Option<Comparator> {
    match key {
        CriterionKey::CurrentJobCountAsc => Some(current_job_count_asc),
        CriterionKey::CurrentWeightAsc => Some(current_weight_asc),
        CriterionKey::RemainingCapacityDesc => Some(remaining_capacity_desc),
        CriterionKey::LastActivityAsc => Some(last_activity_asc),
        CriterionKey::LastActivityDesc => Some(last_activity_desc),
        CriterionKey::VehicleClassPreference => Some(vehicle_class_preference),
        CriterionKey::StatusPriority => Some(status_priority),
        CriterionKey::DistanceToUnitAsc => Some(distance_to_unit_asc),
        CriterionKey::Unknown(_) => None,
    }
}

/// f64 全序比较（NaN 排在最后）
fn cmp_f64(a: f64, b: f64) -> Ordering {
    a.total_cmp(&b)
}

/// 有值者优先；两侧都缺失时相等
fn cmp_present_first<T, F>(a: Option<T>, b: Option<T>, f: F) -> Ordering
where
    F: FnOnce(T, T) -> Ordering,
{
    match (a, b) {
        (Some(a), Some(b)) => f(a, b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn current_job_count_asc(a: &Worker, b: &Worker, _: &RankingContext<'_>) -> Ordering {
    a.current_jobs.cmp(&b.current_jobs)
}

fn current_weight_asc(a: &Worker, b: &Worker, _: &RankingContext<'_>) -> Ordering {
    cmp_f64(a.current_weight_kg, b.current_weight_kg)
}

/// 剩余单量多者优先，单量相同比剩余载重
fn remaining_capacity_desc(a: &Worker, b: &Worker, _: &RankingContext<'_>) -> Ordering {
    b.remaining_jobs()
        .cmp(&a.remaining_jobs())
        .then_with(|| cmp_f64(b.remaining_weight_kg(), a.remaining_weight_kg()))
}

fn last_activity_asc(a: &Worker, b: &Worker, _: &RankingContext<'_>) -> Ordering {
    cmp_present_first(a.last_activity_at, b.last_activity_at, |x, y| x.cmp(&y))
}

fn last_activity_desc(a: &Worker, b: &Worker, _: &RankingContext<'_>) -> Ordering {
    cmp_present_first(a.last_activity_at, b.last_activity_at, |x, y| y.cmp(&x))
}

fn vehicle_class_preference(a: &Worker, b: &Worker, ctx: &RankingContext<'_>) -> Ordering {
    let prefs = &ctx.preferences.vehicle_preference;
    let rank = |w: &Worker| {
        w.vehicle_class
            .and_then(|class| prefs.iter().position(|p| *p == class))
    };
    cmp_present_first(rank(a), rank(b), |x, y| x.cmp(&y))
}

fn status_priority(a: &Worker, b: &Worker, ctx: &RankingContext<'_>) -> Ordering {
    let prefs = &ctx.preferences.status_priority;
    let rank = |w: &Worker| prefs.iter().position(|p| *p == w.status);
    cmp_present_first(rank(a), rank(b), |x, y| x.cmp(&y))
}

fn distance_to_unit_asc(a: &Worker, b: &Worker, ctx: &RankingContext<'_>) -> Ordering {
    let Some(point) = ctx.reference_point else {
        return Ordering::Equal;
    };
    let dist = |w: &Worker| w.location.map(|loc| loc.distance_m(&point));
    cmp_present_first(dist(a), dist(b), cmp_f64)
}
