//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::histogram!()`
//! 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `tfprobe_`
//! - 영역: `engine_`, `run`, `teardown`, `assertion`
//! - 접미어: `_total` (counter), `_seconds` (histogram/latency)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(tfprobe_core::metrics::RUNS_TOTAL, "result" => "passed").increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 엔진 명령 레이블 키 (init, apply, plan, output, destroy)
pub const LABEL_COMMAND: &str = "command";

/// 결과 레이블 키 (success, failure / passed, failed)
pub const LABEL_RESULT: &str = "result";

/// teardown 트리거 레이블 키 (normal, unwind, crash_handler)
pub const LABEL_TRIGGER: &str = "trigger";

// ─── 엔진 메트릭 ───────────────────────────────────────────────────

/// Engine: 실행된 엔진 명령 수 (counter, labels: command, result)
pub const ENGINE_COMMANDS_TOTAL: &str = "tfprobe_engine_commands_total";

/// Engine: 명령 실행 시간 (histogram, 초, label: command)
pub const ENGINE_COMMAND_DURATION_SECONDS: &str = "tfprobe_engine_command_duration_seconds";

/// Engine: 재시도 횟수 (counter, label: command)
pub const ENGINE_RETRIES_TOTAL: &str = "tfprobe_engine_retries_total";

// ─── 라이프사이클 메트릭 ───────────────────────────────────────────

/// Lifecycle: 완료된 실행 수 (counter, label: result)
pub const RUNS_TOTAL: &str = "tfprobe_runs_total";

/// Lifecycle: 실행 소요 시간 (histogram, 초)
pub const RUN_DURATION_SECONDS: &str = "tfprobe_run_duration_seconds";

/// Lifecycle: teardown 실행 수 (counter, labels: trigger, result)
pub const TEARDOWNS_TOTAL: &str = "tfprobe_teardowns_total";

/// Verifier: 실패한 검증 수 (counter)
pub const ASSERTION_FAILURES_TOTAL: &str = "tfprobe_assertion_failures_total";

// ─── 히스토그램 버킷 정의 ────────────────────────────────────────────

/// 엔진 명령 실행 시간 히스토그램 버킷 (초)
///
/// 1s ~ 1h 범위 (apply/destroy는 클라우드 API 대기 포함)
pub const COMMAND_DURATION_BUCKETS: [f64; 10] = [
    1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0, 3600.0,
];

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출해야 합니다.
/// 일반적으로 `tfprobe run` 시작 시점에서 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_histogram};

    // Engine
    describe_counter!(
        ENGINE_COMMANDS_TOTAL,
        "Total number of provisioning engine commands executed"
    );
    describe_histogram!(
        ENGINE_COMMAND_DURATION_SECONDS,
        "Wall-clock time of a single engine command in seconds"
    );
    describe_counter!(
        ENGINE_RETRIES_TOTAL,
        "Total number of engine command retries after retryable errors"
    );

    // Lifecycle
    describe_counter!(RUNS_TOTAL, "Total number of completed test runs");
    describe_histogram!(
        RUN_DURATION_SECONDS,
        "Time from session start to teardown completion in seconds"
    );
    describe_counter!(
        TEARDOWNS_TOTAL,
        "Total number of teardown executions by trigger"
    );
    describe_counter!(
        ASSERTION_FAILURES_TOTAL,
        "Total number of failed output or summary checks"
    );
}
