pub mod document;
pub mod resume;

pub use document::Document;
pub use resume::ResumeData;
