//! Text Chunking Module
//!
//! 빈 줄(연속된 줄바꿈 2개 이상)을 경계로 원문을 문단 단위 패시지로 나눕니다.
//! 문단 안의 단일 줄바꿈은 제거되어 한 줄로 합쳐지고,
//! 정규화 후 너무 짧은 문단(제목, 페이지 번호 등)은 버립니다.

use std::sync::LazyLock;

use regex::Regex;

/// 빈 줄 경계 (CRLF 포함, 줄 사이 공백만 있는 줄도 빈 줄로 취급)
static BLANK_LINES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\r?\n(?:[ \t]*\r?\n)+").expect("blank-line pattern is valid")
});

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// 이 길이(문자 수) 이하의 문단은 버림
    pub min_exclusive_chars: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            min_exclusive_chars: 5,
        }
    }
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 텍스트를 청크로 분할
    fn chunk(&self, text: &str) -> Vec<String>;

    /// 청커 이름
    fn name(&self) -> &'static str;
}

// ============================================================================
// ParagraphChunker
// ============================================================================

/// 문단 청커
pub struct ParagraphChunker {
    config: ChunkConfig,
}

impl ParagraphChunker {
    pub fn new(config: ChunkConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(ChunkConfig::default())
    }

    /// 지연 평가 청크 이터레이터 (한 번만 소비 가능)
    pub fn iter<'a>(&'a self, text: &'a str) -> impl Iterator<Item = String> + 'a {
        BLANK_LINES
            .split(text)
            .map(join_lines)
            .filter(move |unit| unit.chars().count() > self.config.min_exclusive_chars)
    }
}

impl Chunker for ParagraphChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        self.iter(text).collect()
    }

    fn name(&self) -> &'static str {
        "ParagraphChunker"
    }
}

/// 문단 내부 줄바꿈 제거
///
/// 각 줄의 앞뒤 공백을 정리하고 공백 하나로 이어 붙입니다.
fn join_lines(unit: &str) -> String {
    unit.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

// ============================================================================
// Factory Functions
// ============================================================================

/// 기본 청커 생성
pub fn default_chunker() -> Box<dyn Chunker> {
    Box::new(ParagraphChunker::with_defaults())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunker_empty() {
        let chunker = ParagraphChunker::with_defaults();
        assert!(chunker.chunk("").is_empty());
        assert!(chunker.chunk("\n\n\n").is_empty());
    }

    #[test]
    fn test_split_on_blank_lines() {
        let chunker = ParagraphChunker::with_defaults();
        let text = "Rome was founded in 753 BC.\n\nThe Senate governed Rome.";
        let chunks = chunker.chunk(text);
        assert_eq!(
            chunks,
            vec!["Rome was founded in 753 BC.", "The Senate governed Rome."]
        );
    }

    #[test]
    fn test_single_newlines_joined() {
        let chunker = ParagraphChunker::with_defaults();
        let text = "Waste no more time arguing\nabout what a good man\nshould be.";
        let chunks = chunker.chunk(text);
        assert_eq!(
            chunks,
            vec!["Waste no more time arguing about what a good man should be."]
        );
    }

    #[test]
    fn test_indented_lines_trimmed_and_space_joined() {
        let chunker = ParagraphChunker::with_defaults();
        let text = "    Indented verse line\n\tsecond line  \n  third\n\n   short\n\n  spaced   inside  ";
        let chunks = chunker.chunk(text);
        // 줄 앞뒤 공백만 제거, 줄 내부 공백은 유지. 길이는 정리 후 기준
        assert_eq!(
            chunks,
            vec!["Indented verse line second line third", "spaced   inside"]
        );
    }

    #[test]
    fn test_three_or_more_newlines_and_crlf() {
        let chunker = ParagraphChunker::with_defaults();
        let text = "First paragraph.\r\n\r\n\r\nSecond paragraph.\n  \nThird paragraph.";
        let chunks = chunker.chunk(text);
        assert_eq!(
            chunks,
            vec!["First paragraph.", "Second paragraph.", "Third paragraph."]
        );
    }

    #[test]
    fn test_short_units_dropped() {
        let chunker = ParagraphChunker::with_defaults();
        let text = "BOOK I\n\nII\n\n12345\n\n123456\n\nFrom my grandfather Verus I learned good morals.";
        let chunks = chunker.chunk(text);
        // "BOOK I"은 6자라 유지, "12345"는 5자라 제거
        assert_eq!(
            chunks,
            vec![
                "BOOK I",
                "123456",
                "From my grandfather Verus I learned good morals."
            ]
        );
    }

    #[test]
    fn test_length_counts_chars_not_bytes() {
        let chunker = ParagraphChunker::with_defaults();
        // 5문자, 15바이트
        assert!(chunker.chunk("가나다라마").is_empty());
        assert_eq!(chunker.chunk("가나다라마바").len(), 1);
    }

    #[test]
    fn test_every_chunk_is_long_and_single_line() {
        let chunker = ParagraphChunker::with_defaults();
        let text = "a\n\nbb\nccc\n\n\n\nLonger paragraph\nspanning lines\n\n \n\nx\ny\nz\nw\n\nend.";
        for chunk in chunker.chunk(text) {
            assert!(chunk.chars().count() > 5, "too short: {:?}", chunk);
            assert!(!chunk.contains('\n'), "contains newline: {:?}", chunk);
        }
    }

    #[test]
    fn test_iter_is_lazy_and_ordered() {
        let chunker = ParagraphChunker::with_defaults();
        let mut iter = chunker.iter("First unit.\n\nSecond unit.");
        assert_eq!(iter.next().as_deref(), Some("First unit."));
        assert_eq!(iter.next().as_deref(), Some("Second unit."));
        assert_eq!(iter.next(), None);
    }
}
