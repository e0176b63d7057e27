#![forbid(unsafe_code)]

pub mod model;

pub mod ids {
    /// Validated project name: one or more `/`-separated segments, at
    /// most 64 bytes in total. Each segment starts with an ascii
    /// alphanumeric and continues with alphanumerics, `.`, `_`, or `-`.
    #[derive(Clone, Debug, PartialEq, Eq, Hash)]
    pub struct ProjectName(String);

    pub const MAX_PROJECT_NAME_BYTES: usize = 64;

    impl ProjectName {
        pub fn as_str(&self) -> &str {
            &self.0
        }

        /// Innermost segment, e.g. `backend` for `team/backend`.
        pub fn leaf(&self) -> &str {
            self.0.rsplit('/').next().unwrap_or(&self.0)
        }

        pub fn segments(&self) -> impl Iterator<Item = &str> {
            self.0.split('/')
        }

        pub fn try_new(value: impl Into<String>) -> Result<Self, ProjectNameError> {
            let value = value.into();
            validate_project_name(&value)?;
            Ok(Self(value))
        }
    }

    impl std::fmt::Display for ProjectName {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(&self.0)
        }
    }

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum ProjectNameError {
        Empty,
        TooLong,
        /// A leading, trailing, or doubled `/` leaves a segment with no
        /// characters; `segment` is zero-based.
        EmptySegment { segment: usize },
        BadSegmentStart { segment: usize },
        InvalidChar { ch: char, segment: usize },
    }

    fn validate_project_name(value: &str) -> Result<(), ProjectNameError> {
        if value.is_empty() {
            return Err(ProjectNameError::Empty);
        }
        if value.len() > MAX_PROJECT_NAME_BYTES {
            return Err(ProjectNameError::TooLong);
        }
        for (segment, part) in value.split('/').enumerate() {
            let mut chars = part.chars();
            match chars.next() {
                None => return Err(ProjectNameError::EmptySegment { segment }),
                Some(first) if !first.is_ascii_alphanumeric() => {
                    return Err(ProjectNameError::BadSegmentStart { segment });
                }
                Some(_) => {}
            }
            for ch in chars {
                if !ch.is_ascii_alphanumeric() && !matches!(ch, '.' | '_' | '-') {
                    return Err(ProjectNameError::InvalidChar { ch, segment });
                }
            }
        }
        Ok(())
    }

}
