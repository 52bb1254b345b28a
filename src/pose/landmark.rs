use serde::{Deserialize, Serialize};

/// スイング解析で使う13ジョイントのランドマークインデックス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(usize)]
pub enum LandmarkIndex {
    Nose = 0,
    LeftShoulder = 1,
    RightShoulder = 2,
    LeftElbow = 3,
    RightElbow = 4,
    LeftWrist = 5,
    RightWrist = 6,
    LeftHip = 7,
    RightHip = 8,
    LeftKnee = 9,
    RightKnee = 10,
    LeftAnkle = 11,
    RightAnkle = 12,
}

impl LandmarkIndex {
    pub const COUNT: usize = 13;

    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::Nose),
            1 => Some(Self::LeftShoulder),
            2 => Some(Self::RightShoulder),
            3 => Some(Self::LeftElbow),
            4 => Some(Self::RightElbow),
            5 => Some(Self::LeftWrist),
            6 => Some(Self::RightWrist),
            7 => Some(Self::LeftHip),
            8 => Some(Self::RightHip),
            9 => Some(Self::LeftKnee),
            10 => Some(Self::RightKnee),
            11 => Some(Self::LeftAnkle),
            12 => Some(Self::RightAnkle),
            _ => None,
        }
    }
}

/// 単一ランドマーク
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    /// 正規化されたX座標 (0.0〜1.0)
    pub x: f64,
    /// 正規化されたY座標 (0.0〜1.0、下が正)
    pub y: f64,
    /// 奥行き（カメラからの相対深度、バックエンド依存のスケール）
    pub z: f64,
    /// 可視度/信頼度スコア (0.0〜1.0)
    pub visibility: f64,
}

impl Landmark {
    pub fn new(x: f64, y: f64, z: f64, visibility: f64) -> Self {
        Self { x, y, z, visibility }
    }

    /// 可視度が閾値以上か
    pub fn is_valid(&self, threshold: f64) -> bool {
        self.visibility >= threshold
    }
}

impl Default for Landmark {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            visibility: 0.0,
        }
    }
}

/// 1カメラアングル・1フレーム分のランドマークセット
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandmarkFrame {
    pub landmarks: [Landmark; LandmarkIndex::COUNT],
}

impl LandmarkFrame {
    pub fn new(landmarks: [Landmark; LandmarkIndex::COUNT]) -> Self {
        Self { landmarks }
    }

    pub fn get(&self, index: LandmarkIndex) -> &Landmark {
        &self.landmarks[index as usize]
    }

    pub fn set(&mut self, index: LandmarkIndex, landmark: Landmark) {
        self.landmarks[index as usize] = landmark;
    }

    /// 全ランドマークの平均可視度
    pub fn average_visibility(&self) -> f64 {
        let sum: f64 = self.landmarks.iter().map(|l| l.visibility).sum();
        sum / LandmarkIndex::COUNT as f64
    }
}

impl Default for LandmarkFrame {
    fn default() -> Self {
        Self {
            landmarks: [Landmark::default(); LandmarkIndex::COUNT],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_landmark_index_count() {
        assert_eq!(LandmarkIndex::COUNT, 13);
    }

    #[test]
    fn test_landmark_index_from_index() {
        assert_eq!(LandmarkIndex::from_index(0), Some(LandmarkIndex::Nose));
        assert_eq!(LandmarkIndex::from_index(12), Some(LandmarkIndex::RightAnkle));
        assert_eq!(LandmarkIndex::from_index(13), None);
    }

    #[test]
    fn test_landmark_is_valid() {
        let lm = Landmark::new(0.5, 0.5, 0.0, 0.7);
        assert!(lm.is_valid(0.5));
        assert!(!lm.is_valid(0.8));
    }

    #[test]
    fn test_frame_get_set() {
        let mut frame = LandmarkFrame::default();
        frame.set(LandmarkIndex::LeftWrist, Landmark::new(0.3, 0.6, 0.0, 0.9));
        let wrist = frame.get(LandmarkIndex::LeftWrist);
        assert_eq!(wrist.x, 0.3);
        assert_eq!(wrist.y, 0.6);
        assert_eq!(wrist.visibility, 0.9);
    }

    #[test]
    fn test_average_visibility() {
        let frame = LandmarkFrame::new([Landmark::new(0.0, 0.0, 0.0, 0.5); LandmarkIndex::COUNT]);
        assert!((frame.average_visibility() - 0.5).abs() < 1e-9);
    }
}
