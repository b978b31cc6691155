// ==========================================
// 集成测试共享辅助
// ==========================================

#![allow(dead_code)]

pub mod fakes;
pub mod test_data_builder;
