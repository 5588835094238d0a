//! Detects the dominant language of a document's text.
//!
//! The whole (bounded) text is scored as a single unit, so a document that is
//! mostly Dutch with a closing English sentence comes out as Dutch.

use encoding_rs::Encoding;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};
use whatlang::{Detector, Lang};

use crate::charset::decode_bounded;
use crate::config::{ConfigError, HandlerConfig, LanguageTaggerConfig};
use crate::doc::Metadata;
use crate::doc::metadata::LANGUAGE;
use crate::handler::{Handler, HandlerContext, HandlerError, Outcome, source_encoding};
use crate::merge;
use crate::restriction::Restrictions;

/// Scores text against candidate languages.
pub trait LanguageModel: Send + Sync {
    fn supports(&self, code: &str) -> bool;

    /// Probability per candidate, in candidate order. Candidates the model has
    /// no opinion on may be left out. With no candidates the model picks among
    /// every language it knows.
    fn score(&self, text: &str, candidates: &[String]) -> Vec<(String, f64)>;
}

const LANG_CODES: &[(&str, Lang)] = &[
    ("af", Lang::Afr),
    ("ar", Lang::Ara),
    ("be", Lang::Bel),
    ("bg", Lang::Bul),
    ("ca", Lang::Cat),
    ("cs", Lang::Ces),
    ("da", Lang::Dan),
    ("de", Lang::Deu),
    ("el", Lang::Ell),
    ("en", Lang::Eng),
    ("eo", Lang::Epo),
    ("es", Lang::Spa),
    ("et", Lang::Est),
    ("fi", Lang::Fin),
    ("fr", Lang::Fra),
    ("he", Lang::Heb),
    ("hi", Lang::Hin),
    ("hr", Lang::Hrv),
    ("hu", Lang::Hun),
    ("id", Lang::Ind),
    ("it", Lang::Ita),
    ("ja", Lang::Jpn),
    ("ko", Lang::Kor),
    ("la", Lang::Lat),
    ("lt", Lang::Lit),
    ("lv", Lang::Lav),
    ("nb", Lang::Nob),
    ("nl", Lang::Nld),
    ("pl", Lang::Pol),
    ("pt", Lang::Por),
    ("ro", Lang::Ron),
    ("ru", Lang::Rus),
    ("sk", Lang::Slk),
    ("sl", Lang::Slv),
    ("sr", Lang::Srp),
    ("sv", Lang::Swe),
    ("th", Lang::Tha),
    ("tr", Lang::Tur),
    ("uk", Lang::Ukr),
    ("vi", Lang::Vie),
    ("zh", Lang::Cmn),
];

fn lang_for_code(code: &str) -> Option<Lang> {
    LANG_CODES
        .iter()
        .find(|(c, _)| c.eq_ignore_ascii_case(code))
        .map(|(_, lang)| *lang)
}

fn code_for_lang(lang: Lang) -> String {
    LANG_CODES
        .iter()
        .find(|(_, l)| *l == lang)
        .map(|(c, _)| c.to_string())
        .unwrap_or_else(|| lang.code().to_string())
}

/// Trigram model from `whatlang`.
///
/// Candidates are compared pairwise: each pair is decided by the detector
/// restricted to those two languages, the winner earning `(1 + confidence) / 2`
/// and the loser the rest. Totals are normalised into probabilities.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhatlangModel;

impl LanguageModel for WhatlangModel {
    fn supports(&self, code: &str) -> bool {
        lang_for_code(code).is_some()
    }

    fn score(&self, text: &str, candidates: &[String]) -> Vec<(String, f64)> {
        if candidates.is_empty() {
            return whatlang::detect(text)
                .map(|info| vec![(code_for_lang(info.lang()), info.confidence())])
                .unwrap_or_default();
        }

        let langs: Vec<(&String, Lang)> = candidates
            .iter()
            .filter_map(|code| lang_for_code(code).map(|lang| (code, lang)))
            .collect();

        if let [(code, lang)] = langs.as_slice() {
            return Detector::with_allowlist(vec![*lang])
                .detect(text)
                .map(|_| vec![(code.to_string(), 1.0)])
                .unwrap_or_default();
        }

        let mut points: HashMap<Lang, f64> = HashMap::new();
        for (i, (_, a)) in langs.iter().enumerate() {
            for (_, b) in &langs[i + 1..] {
                let Some(info) = Detector::with_allowlist(vec![*a, *b]).detect(text) else {
                    continue;
                };
                let (winner, loser) = if info.lang() == *a { (*a, *b) } else { (*b, *a) };
                let confidence = info.confidence().clamp(0.0, 1.0);
                *points.entry(winner).or_default() += (1.0 + confidence) / 2.0;
                *points.entry(loser).or_default() += (1.0 - confidence) / 2.0;
            }
        }

        let total: f64 = points.values().sum();
        if total <= 0.0 {
            return Vec::new();
        }
        langs
            .iter()
            .filter_map(|(code, lang)| points.get(lang).map(|p| (code.to_string(), p / total)))
            .collect()
    }
}

pub struct LanguageTagger {
    restrictions: Restrictions,
    languages: Vec<String>,
    keep_probabilities: bool,
    fallback_language: Option<String>,
    min_confidence: f64,
    max_read_size: usize,
    source_charset: Option<String>,
    encoding: Option<&'static Encoding>,
    model: Arc<dyn LanguageModel>,
}

impl LanguageTagger {
    pub fn from_config(config: &LanguageTaggerConfig) -> Result<Self, ConfigError> {
        Self::with_model(config, Arc::new(WhatlangModel))
    }

    pub fn with_model(
        config: &LanguageTaggerConfig,
        model: Arc<dyn LanguageModel>,
    ) -> Result<Self, ConfigError> {
        if let Some(code) = config.languages.iter().find(|c| !model.supports(c)) {
            return Err(ConfigError::UnsupportedLanguage(code.clone()));
        }
        if !(0.0..=1.0).contains(&config.min_confidence) {
            return Err(ConfigError::InvalidValue {
                field: "minConfidence",
                reason: format!("{} is not within [0, 1]", config.min_confidence),
            });
        }
        if config.max_read_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "maxReadSize",
                reason: "must be positive".to_string(),
            });
        }
        Ok(Self {
            restrictions: Restrictions::from_configs(&config.restrict_to)?,
            languages: config.languages.clone(),
            keep_probabilities: config.keep_probabilities,
            fallback_language: config.fallback_language.clone(),
            min_confidence: config.min_confidence,
            max_read_size: config.max_read_size,
            source_charset: config.source_charset.clone(),
            encoding: source_encoding(config.source_charset.as_deref())?,
            model,
        })
    }

    /// Ranked `(code, probability)` pairs for `text`, most probable first.
    pub fn rank(&self, text: &str) -> Vec<(String, f64)> {
        merge::rank_by_score(self.model.score(text, &self.languages))
    }

    fn pick(&self, ranked: &[(String, f64)]) -> Option<String> {
        match ranked.first() {
            Some((code, p)) if *p > 0.0 && *p >= self.min_confidence => Some(code.clone()),
            _ => self.fallback_language.clone(),
        }
    }
}

impl Handler for LanguageTagger {
    fn kind(&self) -> &'static str {
        "languageTagger"
    }

    fn restrictions(&self) -> &Restrictions {
        &self.restrictions
    }

    #[instrument(skip_all, fields(reference = %ctx.reference()))]
    fn execute(&self, ctx: &mut HandlerContext<'_>) -> Result<Outcome, HandlerError> {
        let encoding = ctx.resolve_encoding(self.encoding)?;
        let reader = ctx.content().reader().map_err(|e| ctx.io_error(e))?;
        let (text, truncated) =
            decode_bounded(reader, encoding, self.max_read_size).map_err(|e| ctx.io_error(e))?;
        if truncated {
            debug!("Detecting language on the first {} bytes only", self.max_read_size);
        }

        let ranked = self.rank(&text);
        let Some(language) = self.pick(&ranked) else {
            debug!("No language detected and no fallback configured");
            return Ok(Outcome::Continue);
        };
        debug!("Detected language: {}", language);

        let metadata = ctx.metadata_mut();
        clear_probabilities(metadata);
        metadata.set(LANGUAGE, [language]);
        if self.keep_probabilities {
            for (rank, (code, probability)) in ranked.iter().enumerate() {
                let prefix = format!("{LANGUAGE}.{}", rank + 1);
                metadata.set(format!("{prefix}.tag"), [code.as_str()]);
                metadata.set(format!("{prefix}.probability"), [format!("{probability:.4}")]);
            }
        }
        Ok(Outcome::Continue)
    }

    fn config(&self) -> HandlerConfig {
        HandlerConfig::LanguageTagger(LanguageTaggerConfig {
            restrict_to: self.restrictions.to_configs(),
            languages: self.languages.clone(),
            keep_probabilities: self.keep_probabilities,
            fallback_language: self.fallback_language.clone(),
            min_confidence: self.min_confidence,
            max_read_size: self.max_read_size,
            source_charset: self.source_charset.clone(),
        })
    }
}

/// Drops `document.language.<rank>.*` fields left by an earlier detection.
fn clear_probabilities(metadata: &mut Metadata) {
    let prefix = format!("{LANGUAGE}.");
    let stale: Vec<String> = metadata
        .iter()
        .map(|(field, _)| field)
        .filter(|field| {
            field
                .strip_prefix(&prefix)
                .and_then(|rest| rest.split_once('.'))
                .is_some_and(|(rank, _)| !rank.is_empty() && rank.bytes().all(|b| b.is_ascii_digit()))
        })
        .map(str::to_string)
        .collect();
    for field in stale {
        metadata.remove(&field);
    }
}
