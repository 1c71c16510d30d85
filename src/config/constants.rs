//! 수치 연산과 기본 설정값 상수

/// 버터플라이 팩터화 연산에 쓰이는 상수들
pub struct Constants;

impl Constants {
    /// Sinkhorn 정규화 기본 반복 횟수
    pub const DEFAULT_SINKHORN_ITERS: usize = 5;

    /// softmax / Sinkhorn 기본 온도
    pub const DEFAULT_TEMPERATURE: f32 = 1.0;

    /// 무작위 파라미터 초기화의 표준편차
    pub const INIT_STD: f32 = 1.0;

    /// allclose 상대 허용오차
    pub const RTOL: f32 = 1e-5;

    /// allclose 절대 허용오차
    pub const ATOL: f32 = 1e-5;
}
