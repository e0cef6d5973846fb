//! 전처리 모듈 - 임베딩 전 텍스트 정규화
//!
//! 두 가지 구현을 제공합니다:
//! - `IdentityPreprocessor`: 입력 그대로 반환
//! - `LemmatizingPreprocessor`: 토큰화 → 구두점/불용어 제거 → 표제어 변환 → 공백 결합
//!
//! 표제어 변환은 영어 불규칙 형태 사전 + 접미사 규칙 기반의 경량 구현입니다.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

/// 단어(축약형 포함) 또는 구두점 연속
static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\p{L}\p{N}]+(?:['’][\p{L}]+)*|[^\s\p{L}\p{N}]+").expect("token pattern is valid")
});

/// 영어 불용어
const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any", "are",
    "as", "at", "be", "because", "been", "before", "being", "below", "between", "both", "but",
    "by", "can", "could", "did", "do", "does", "doing", "down", "during", "each", "few", "for",
    "from", "further", "had", "has", "have", "having", "he", "her", "here", "hers", "herself",
    "him", "himself", "his", "how", "i", "if", "in", "into", "is", "it", "its", "itself", "just",
    "me", "more", "most", "my", "myself", "no", "nor", "not", "now", "of", "off", "on", "once",
    "only", "or", "other", "our", "ours", "ourselves", "out", "over", "own", "same", "she",
    "should", "so", "some", "such", "than", "that", "the", "their", "theirs", "them",
    "themselves", "then", "there", "these", "they", "this", "those", "through", "to", "too",
    "under", "until", "up", "very", "was", "we", "were", "what", "when", "where", "which",
    "while", "who", "whom", "why", "will", "with", "would", "you", "your", "yours", "yourself",
    "yourselves", "don't", "doesn't", "didn't", "isn't", "wasn't", "can't", "won't", "it's",
];

/// 불규칙 형태 → 표제어
const IRREGULAR_LEMMAS: &[(&str, &str)] = &[
    ("was", "be"), ("were", "be"), ("is", "be"), ("are", "be"), ("been", "be"), ("am", "be"),
    ("has", "have"), ("had", "have"), ("did", "do"), ("does", "do"), ("done", "do"),
    ("went", "go"), ("gone", "go"), ("made", "make"), ("said", "say"), ("took", "take"),
    ("taken", "take"), ("gave", "give"), ("given", "give"), ("came", "come"), ("knew", "know"),
    ("known", "know"), ("thought", "think"), ("saw", "see"), ("seen", "see"), ("began", "begin"),
    ("begun", "begin"), ("wrote", "write"), ("written", "write"), ("fought", "fight"),
    ("taught", "teach"), ("learnt", "learn"), ("ruled", "rule"), ("lives", "life"),
    ("men", "man"), ("women", "woman"), ("children", "child"), ("people", "person"),
    ("gods", "god"), ("better", "good"), ("best", "good"), ("worse", "bad"), ("worst", "bad"),
];

// ============================================================================
// Preprocessor Trait
// ============================================================================

/// 임베딩 전 텍스트 정규화 트레이트
pub trait Preprocessor: Send + Sync {
    fn normalize(&self, text: &str) -> String;

    /// 저장소 메타데이터에 기록되는 이름
    fn name(&self) -> &'static str;
}

/// 전처리 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PreprocessorKind {
    #[default]
    Identity,
    Lemmatize,
}

impl PreprocessorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PreprocessorKind::Identity => "identity",
            PreprocessorKind::Lemmatize => "lemmatize",
        }
    }
}

impl FromStr for PreprocessorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "identity" => Ok(PreprocessorKind::Identity),
            "lemmatize" => Ok(PreprocessorKind::Lemmatize),
            other => Err(format!("unknown preprocessor: {}", other)),
        }
    }
}

// ============================================================================
// IdentityPreprocessor
// ============================================================================

#[derive(Debug, Default)]
pub struct IdentityPreprocessor;

impl Preprocessor for IdentityPreprocessor {
    fn normalize(&self, text: &str) -> String {
        text.to_string()
    }

    fn name(&self) -> &'static str {
        PreprocessorKind::Identity.as_str()
    }
}

// ============================================================================
// LemmatizingPreprocessor
// ============================================================================

/// 불용어 제거 + 표제어 변환 전처리기
pub struct LemmatizingPreprocessor {
    stop_words: HashSet<&'static str>,
    irregular: HashMap<&'static str, &'static str>,
}

impl Default for LemmatizingPreprocessor {
    fn default() -> Self {
        Self::new()
    }
}

impl LemmatizingPreprocessor {
    pub fn new() -> Self {
        Self {
            stop_words: STOP_WORDS.iter().copied().collect(),
            irregular: IRREGULAR_LEMMAS.iter().copied().collect(),
        }
    }

    /// 단일 토큰의 표제어
    fn lemma(&self, token: &str) -> String {
        if let Some(lemma) = self.irregular.get(token) {
            return (*lemma).to_string();
        }
        // 숫자나 짧은 단어는 그대로
        if token.chars().count() <= 3 || token.chars().any(|c| c.is_numeric()) {
            return token.to_string();
        }
        strip_suffix(token)
    }
}

impl Preprocessor for LemmatizingPreprocessor {
    /// 불용어만 남으면 소문자 단어열로, 단어가 없으면 원문(trim)으로 대체
    ///
    /// 결과가 빈 문자열이면 임베딩 API가 요청을 거부합니다.
    fn normalize(&self, text: &str) -> String {
        let words: Vec<String> = TOKEN
            .find_iter(text)
            .map(|m| m.as_str().replace('’', "'").to_lowercase())
            .filter(|token| !is_punctuation(token))
            .collect();

        let lemmas: Vec<String> = words
            .iter()
            .filter(|token| !self.stop_words.contains(token.as_str()))
            .map(|token| self.lemma(token))
            .collect();

        if !lemmas.is_empty() {
            lemmas.join(" ")
        } else if !words.is_empty() {
            words.join(" ")
        } else {
            text.trim().to_string()
        }
    }

    fn name(&self) -> &'static str {
        PreprocessorKind::Lemmatize.as_str()
    }
}

fn is_punctuation(token: &str) -> bool {
    !token.chars().any(char::is_alphanumeric)
}

/// 접미사 규칙
fn strip_suffix(word: &str) -> String {
    if let Some(stem) = word.strip_suffix("ies") {
        return format!("{}y", stem);
    }
    if word.ends_with("sses") || word.ends_with("shes") || word.ends_with("ches") {
        return word[..word.len() - 2].to_string();
    }
    if let Some(stem) = word.strip_suffix("ing") {
        if stem.chars().count() >= 3 {
            return undouble(stem);
        }
    }
    if let Some(stem) = word.strip_suffix("ied") {
        return format!("{}y", stem);
    }
    if let Some(stem) = word.strip_suffix("ed") {
        if stem.chars().count() >= 3 {
            return undouble(stem);
        }
    }
    if word.ends_with('s')
        && !word.ends_with("ss")
        && !word.ends_with("us")
        && !word.ends_with("is")
    {
        return word[..word.len() - 1].to_string();
    }
    word.to_string()
}

/// "runn" → "run" (l, s, z 중복은 유지)
fn undouble(stem: &str) -> String {
    let mut chars = stem.chars().rev();
    if let (Some(last), Some(prev)) = (chars.next(), chars.next()) {
        if last == prev && !"aeioulsz".contains(last) && last.is_alphabetic() {
            return stem[..stem.len() - last.len_utf8()].to_string();
        }
    }
    stem.to_string()
}

// ============================================================================
// Factory Functions
// ============================================================================

/// 설정에 맞는 전처리기 생성
pub fn preprocessor_for(kind: PreprocessorKind) -> Box<dyn Preprocessor> {
    match kind {
        PreprocessorKind::Identity => Box::new(IdentityPreprocessor),
        PreprocessorKind::Lemmatize => Box::new(LemmatizingPreprocessor::new()),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_returns_input() {
        let text = "The Senate governed Rome.";
        assert_eq!(IdentityPreprocessor.normalize(text), text);
    }

    #[test]
    fn test_lemmatizer_drops_stop_words_and_punctuation() {
        let p = LemmatizingPreprocessor::new();
        assert_eq!(p.normalize("Rome was founded in 753 BC."), "rome found 753 bc");
        assert_eq!(p.normalize("The Senate governed Rome."), "senate govern rome");
    }

    #[test]
    fn test_lemmatizer_plurals_and_irregulars() {
        let p = LemmatizingPreprocessor::new();
        assert_eq!(p.normalize("cities"), "city");
        assert_eq!(p.normalize("emperors"), "emperor");
        assert_eq!(p.normalize("running"), "run");
        assert_eq!(p.normalize("children"), "child");
        assert_eq!(p.normalize("marches"), "march");
        assert_eq!(p.normalize("virtus"), "virtus");
    }

    #[test]
    fn test_lemmatizer_contractions_are_stop_words() {
        let p = LemmatizingPreprocessor::new();
        assert_eq!(p.normalize("Don't waste time!"), "waste time");
        assert_eq!(p.normalize("It’s fine"), "fine");
    }

    #[test]
    fn test_lemmatizer_never_returns_empty_for_stop_word_text() {
        let p = LemmatizingPreprocessor::new();
        assert_eq!(p.normalize("It is what it is."), "it is what it is");
        assert_eq!(p.normalize("Who is he?"), "who is he");
        assert_eq!(p.normalize(" ?!... "), "?!...");
        assert_eq!(p.normalize(""), "");
    }

    #[test]
    fn test_lemmatizer_single_spaces() {
        let p = LemmatizingPreprocessor::new();
        let out = p.normalize("  Emperor ,  philosopher ;  stoic  ");
        assert_eq!(out, "emperor philosopher stoic");
    }

    #[test]
    fn test_kind_round_trip_and_factory() {
        assert_eq!(
            "lemmatize".parse::<PreprocessorKind>(),
            Ok(PreprocessorKind::Lemmatize)
        );
        assert!("stem".parse::<PreprocessorKind>().is_err());
        assert_eq!(preprocessor_for(PreprocessorKind::Identity).name(), "identity");
        assert_eq!(preprocessor_for(PreprocessorKind::Lemmatize).name(), "lemmatize");
    }
}
