//! Statistical language detection backed by `whatlang`.

use whatlang::Lang;

use crate::collaborators::LanguageDetector;
use crate::error::IngestError;

/// Default [`LanguageDetector`]. Answers ISO 639-1 codes where one exists,
/// otherwise the ISO 639-3 code `whatlang` reports.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhatlangDetector;

impl LanguageDetector for WhatlangDetector {
    fn detect(&self, text: &str) -> Result<String, IngestError> {
        let info = whatlang::detect(text).ok_or_else(|| IngestError::DetectionFailed {
            reason: "no language candidate".to_string(),
        })?;
        Ok(iso_639_1(info.lang()).unwrap_or_else(|| info.lang().code()).to_string())
    }
}

fn iso_639_1(lang: Lang) -> Option<&'static str> {
    let code = match lang {
        Lang::Eng => "en",
        Lang::Deu => "de",
        Lang::Fra => "fr",
        Lang::Spa => "es",
        Lang::Por => "pt",
        Lang::Ita => "it",
        Lang::Nld => "nl",
        Lang::Rus => "ru",
        Lang::Ukr => "uk",
        Lang::Pol => "pl",
        Lang::Ces => "cs",
        Lang::Slk => "sk",
        Lang::Hun => "hu",
        Lang::Ron => "ro",
        Lang::Bul => "bg",
        Lang::Ell => "el",
        Lang::Tur => "tr",
        Lang::Swe => "sv",
        Lang::Dan => "da",
        Lang::Nob => "nb",
        Lang::Fin => "fi",
        Lang::Est => "et",
        Lang::Lav => "lv",
        Lang::Lit => "lt",
        Lang::Hrv => "hr",
        Lang::Srp => "sr",
        Lang::Slv => "sl",
        Lang::Cat => "ca",
        Lang::Ara => "ar",
        Lang::Heb => "he",
        Lang::Pes => "fa",
        Lang::Hin => "hi",
        Lang::Ben => "bn",
        Lang::Urd => "ur",
        Lang::Cmn => "zh",
        Lang::Jpn => "ja",
        Lang::Kor => "ko",
        Lang::Vie => "vi",
        Lang::Tha => "th",
        Lang::Ind => "id",
        _ => return None,
    };
    Some(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_english() {
        let text = "The river burst its banks overnight and residents were evacuated \
                    from low lying neighbourhoods as emergency crews worked until dawn.";
        assert_eq!(WhatlangDetector.detect(text).unwrap(), "en");
    }

    #[test]
    fn test_detects_german() {
        let text = "Der Fluss ist über die Ufer getreten und die Bewohner mussten \
                    in der Nacht ihre Häuser verlassen, weil das Wasser weiter stieg.";
        assert_eq!(WhatlangDetector.detect(text).unwrap(), "de");
    }

    #[test]
    fn test_empty_text_fails() {
        let err = WhatlangDetector.detect("").unwrap_err();
        assert!(matches!(err, IngestError::DetectionFailed { .. }));
    }
}
