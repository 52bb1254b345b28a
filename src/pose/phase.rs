use serde::{Deserialize, Serialize};

/// スイングの4つの局面
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwingPhase {
    Address,
    Top,
    Impact,
    Finish,
}

/// 局面→バッファ内フレームインデックスのマッピング
///
/// 検出できなかった局面はNone（致命的エラーにはしない）。
/// 存在するインデックスは局面順に厳密増加する。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SwingPhaseMap {
    pub address: Option<usize>,
    pub top: Option<usize>,
    pub impact: Option<usize>,
    pub finish: Option<usize>,
}

impl SwingPhaseMap {
    pub fn get(&self, phase: SwingPhase) -> Option<usize> {
        match phase {
            SwingPhase::Address => self.address,
            SwingPhase::Top => self.top,
            SwingPhase::Impact => self.impact,
            SwingPhase::Finish => self.finish,
        }
    }

    /// 指標計算に足る情報があるか（アドレスが最低条件）
    pub fn is_usable(&self) -> bool {
        self.address.is_some()
    }

    /// 厳密増加を破る局面を後ろからNoneに落とす。
    /// 並べ替えはしない: ヒューリスティックが矛盾した時点でその局面は信用しない。
    pub fn enforce_ordering(mut self) -> Self {
        let mut last = match self.address {
            Some(idx) => idx,
            None => return self,
        };
        for slot in [&mut self.top, &mut self.impact, &mut self.finish] {
            match *slot {
                Some(idx) if idx > last => last = idx,
                Some(_) => *slot = None,
                None => {}
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_kept_when_increasing() {
        let map = SwingPhaseMap {
            address: Some(0),
            top: Some(90),
            impact: Some(120),
            finish: Some(299),
        };
        assert_eq!(map.clone().enforce_ordering(), map);
    }

    #[test]
    fn test_ordering_drops_violating_phase() {
        // impactがtopより前: impactを落とし、finishは維持
        let map = SwingPhaseMap {
            address: Some(0),
            top: Some(90),
            impact: Some(80),
            finish: Some(299),
        };
        let fixed = map.enforce_ordering();
        assert_eq!(fixed.top, Some(90));
        assert_eq!(fixed.impact, None);
        assert_eq!(fixed.finish, Some(299));
    }

    #[test]
    fn test_ordering_equal_index_dropped() {
        let map = SwingPhaseMap {
            address: Some(5),
            top: Some(5),
            impact: Some(10),
            finish: None,
        };
        let fixed = map.enforce_ordering();
        assert_eq!(fixed.top, None);
        assert_eq!(fixed.impact, Some(10));
    }

    #[test]
    fn test_usable_requires_address() {
        assert!(!SwingPhaseMap::default().is_usable());
        let map = SwingPhaseMap {
            address: Some(0),
            ..Default::default()
        };
        assert!(map.is_usable());
    }
}
