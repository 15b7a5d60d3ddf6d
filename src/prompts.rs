//! Prompts for the vision and generation stages.
//!
//! Keeping every prompt here means changing model instructions touches one
//! file, and tests can inspect the rendered prompts without a live model.

/// Instruction appended after the OCR text in the extraction prompt.
pub const EXTRACTION_INSTRUCTIONS: &str = "Return a valid, properly formatted JSON object with \
exactly two root keys: 'problemInfo' and 'language'. The 'problemInfo' key must contain a single \
string with the full problem statement, including constraints and examples. The 'language' key \
must contain a string naming the programming language. Do not include nested JSON objects or \
arrays. Escape all quotes properly. Return only the JSON object with no additional text.";

/// Instruction block for the generation prompt.
pub const GENERATION_INSTRUCTIONS: &str = "Return a JSON object with the keys 'Explanation', \
'Code', 'Time Complexity', 'Space Complexity', 'complexity_explanation' and \
'Problem Information'. 'Explanation' covers the brute force, better and optimal approaches in \
short paragraphs. 'Code' is formatted within triple backticks. 'Time Complexity' and \
'Space Complexity' use Big O notation. 'complexity_explanation' explains both complexities. \
'Problem Information' holds the title and problem description. Use proper JSON formatting and \
add no commentary.";

/// Build the vision prompt sent alongside the screenshot.
///
/// The OCR markdown is fenced between explicit markers so the model can tell
/// recognised text apart from instructions.
pub fn extraction_prompt(ocr_markdown: &str, language: &str) -> String {
    format!(
        "This image's OCR in markdown:\n<BEGIN_IMAGE_OCR>\n{ocr_markdown}\n<END_IMAGE_OCR>.\n\
         Language expected: {language}\n{EXTRACTION_INSTRUCTIONS}"
    )
}

/// Build the generation prompt for a problem statement.
pub fn generation_prompt(problem: &str, language: &str) -> String {
    format!(
        "Generate a complete solution in {language}. {GENERATION_INSTRUCTIONS} \
         Problem Information: {problem}."
    )
}
