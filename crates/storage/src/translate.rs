#![forbid(unsafe_code)]

use crate::Store;

impl Store {
    /// Localized text for `word`. With a user, the user's language is used and a
    /// translation scoped to the user's current module wins over a global one.
    /// Missing entries fall back to the word itself.
    pub fn translate(&self, word: &str, user: Option<i64>) -> String {
        let found = match user {
            Some(user) if user > 0 => self.value(
                r#"
                SELECT translation
                FROM ejaTranslations
                WHERE word = ?
                  AND ejaLanguage = (SELECT ejaLanguage FROM ejaUsers WHERE ejaUsers.ejaId = ?)
                  AND (
                    ejaModuleId = 0
                    OR ejaModuleId = ''
                    OR ejaModuleId = (
                      SELECT value FROM ejaSessions WHERE ejaSessions.name = 'ejaModuleId' AND ejaSessions.ejaOwner = ?
                    )
                  )
                ORDER BY ejaModuleId DESC
                LIMIT 1
                "#,
                &crate::args![word, user, user],
            ),
            _ => self.value(
                "SELECT translation FROM ejaTranslations WHERE word=? AND (ejaLanguage=0 OR ejaLanguage='') LIMIT 1",
                &crate::args![word],
            ),
        };
        match found {
            Ok(text) if !text.is_empty() => text,
            _ if self.translation_debug => format!("{{{word}}}"),
            _ => word.to_string(),
        }
    }

    /// Translation in an explicit language, ignoring user and module scope.
    pub fn translate_in(&self, word: &str, language: &str) -> String {
        match self.value(
            "SELECT translation FROM ejaTranslations WHERE word=? AND ejaLanguage=? ORDER BY ejaModuleId DESC LIMIT 1",
            &crate::args![word, language],
        ) {
            Ok(text) if !text.is_empty() => text,
            _ => self.translate(word, None),
        }
    }
}
