use roastbooth_gallery::Person;

/// Separator placed between annotations in the prompt context.
pub const ANNOTATION_DELIMITER: &str = ", ";

/// Everything the text generator needs to know about the identified person.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub person_name: String,

    /// Annotations in insertion order.
    pub prior_annotations: Vec<String>,
}

impl GenerationRequest {
    /// The annotations joined with [`ANNOTATION_DELIMITER`]. Empty when
    /// there are none.
    pub fn context(&self) -> String {
        self.prior_annotations.join(ANNOTATION_DELIMITER)
    }

    /// The user message sent to the generator.
    ///
    /// ```text
    /// Roastee: {name}
    /// Existing Roasts: {annotation}, {annotation}, ...
    /// ```
    pub fn user_content(&self) -> String {
        format!(
            "Roastee: {}\nExisting Roasts: {}",
            self.person_name,
            self.context()
        )
    }
}

/// Builds [`GenerationRequest`]s. Deterministic and infallible.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextAssembler;

impl ContextAssembler {
    pub fn new() -> Self {
        Self
    }

    pub fn build_prompt(&self, person: &Person, annotations: Vec<String>) -> GenerationRequest {
        GenerationRequest {
            person_name: person.name.clone(),
            prior_annotations: annotations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Person {
        Person {
            id: 1,
            name: "Alice".into(),
        }
    }

    #[test]
    fn joins_annotations_in_order() {
        let req = ContextAssembler::new().build_prompt(
            &alice(),
            vec!["loud laugh".into(), "always late".into()],
        );
        assert_eq!(req.context(), "loud laugh, always late");
        assert_eq!(
            req.user_content(),
            "Roastee: Alice\nExisting Roasts: loud laugh, always late"
        );
    }

    #[test]
    fn empty_annotations_still_build() {
        let req = ContextAssembler::new().build_prompt(&alice(), Vec::new());
        assert_eq!(req.person_name, "Alice");
        assert_eq!(req.context(), "");
        assert_eq!(req.user_content(), "Roastee: Alice\nExisting Roasts: ");
    }
}
