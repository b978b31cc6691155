// ==========================================
// 配送派单核心 - 规则直派策略
// ==========================================
// 流程: 兼容性过滤 → 按站点排序键排序 → 排名最高且有运力者中选
// ==========================================

use crate::domain::bundle::AllocatableUnit;
use crate::domain::plan::AssignmentPlan;
use crate::engine::error::AllocationResult;
use crate::engine::ledger::WorkerLedger;
use crate::engine::strategy::{place_units, AllocationStrategy, StrategyContext, StrategyKind};
use async_trait::async_trait;
use tracing::{info, instrument};

#[derive(Debug, Clone, Default)]
pub struct DirectStrategy;

impl DirectStrategy {
    pub fn new() -> Self {
        Self
    }

    /// 同步执行（优化器降级时也走这里）
    pub fn allocate(
        &self,
        units: Vec<AllocatableUnit>,
        ledger: &mut WorkerLedger,
        ctx: &StrategyContext<'_>,
    ) -> AssignmentPlan {
        // 不优先整单放置时，并单一开始就拆开
        let units: Vec<AllocatableUnit> = if ctx.config.prefer_bundles {
            units
        } else {
            units.into_iter().flat_map(AllocatableUnit::into_singles).collect()
        };

        let criteria = &ctx.config.criteria_order;
        let plan = place_units(units, ledger, ctx, |ledger, unit| {
            let compatible = ledger.compatible_workers(unit, ctx.now);
            ctx.ranking
                .rank_for_point(compatible, criteria, unit.origin())
                .into_iter()
                .map(|w| w.id.clone())
                .collect()
        });

        info!(
            hub_id = %ctx.hub_id,
            assigned_count = plan.assigned_count(),
            dropped_count = plan.dropped().len(),
            "规则直派完成"
        );
        plan
    }
}

#[async_trait]
impl AllocationStrategy for DirectStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Direct
    }

    #[instrument(skip_all, fields(hub_id = %ctx.hub_id, units_count = units.len()))]
    async fn execute(
        &self,
        units: Vec<AllocatableUnit>,
        ledger: &mut WorkerLedger,
        ctx: &StrategyContext<'_>,
    ) -> AllocationResult<AssignmentPlan> {
        Ok(self.allocate(units, ledger, ctx))
    }
}
