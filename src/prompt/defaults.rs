//! Default prompt templates for synthesis, keyword extraction, and
//! multi-step query decomposition.

use super::PromptTemplate;

const TEXT_QA_TMPL: &str = "Context information is below. \n\
    ---------------------\n\
    {context_str}\n\
    ---------------------\n\
    Given the context information and not prior knowledge, \
    answer the question: {query_str}\n";

const REFINE_TMPL: &str = "The original question is as follows: {query_str}\n\
    We have provided an existing answer: {existing_answer}\n\
    We have the opportunity to refine the existing answer \
    (only if needed) with some more context below.\n\
    ------------\n\
    {context_msg}\n\
    ------------\n\
    Given the new context, refine the original answer to better \
    answer the question. \
    If the context isn't useful, return the original answer.";

const KEYWORD_EXTRACT_TMPL: &str = "Some text is provided below. Given the text, \
    extract up to {max_keywords} keywords from the text. Avoid stopwords.\n\
    ---------------------\n\
    {text}\n\
    ---------------------\n\
    Provide keywords in the following comma-separated format: 'KEYWORDS: <keywords>'\n";

const QUERY_KEYWORD_EXTRACT_TMPL: &str = "A question is provided below. Given the question, \
    extract up to {max_keywords} keywords from the text. Focus on extracting the keywords \
    that we can use to best lookup answers to the question. Avoid stopwords.\n\
    ---------------------\n\
    {question}\n\
    ---------------------\n\
    Provide keywords in the following comma-separated format: 'KEYWORDS: <keywords>'\n";

const STEP_DECOMPOSE_TMPL: &str = "The original question is as follows: {query_str}\n\
    We have an opportunity to answer some, or all of the question from a \
    knowledge source. \
    Context information for the knowledge source is provided below, as \
    well as previous reasoning steps.\n\
    Given the context and previous reasoning, return a question that can \
    be answered from the context. This question can be the same as the original \
    question, or this question can represent a subcomponent of the overall question.\n\
    It should not be irrelevant to the original question.\n\
    If we cannot extract more information from the context, provide 'None' \
    as the answer.\n\
    Some examples are given below:\n\
    \n\
    Question: How many Grand Slam titles does the winner of the 2020 Australian \
    Open have?\n\
    Knowledge source context: Provides names of the winners of the 2020 \
    Australian Open\n\
    Previous reasoning: None\n\
    Next question: Who was the winner of the 2020 Australian Open?\n\
    \n\
    Question: How many Grand Slam titles does the winner of the 2020 Australian \
    Open have?\n\
    Knowledge source context: Provides information about the winners of the 2020 \
    Australian Open - includes biographical information for each winner\n\
    Previous reasoning:\n\
    - Who was the winner of the 2020 Australian Open?\n\
    - The winner of the 2020 Australian Open was Novak Djokovic.\n\
    New question: How many Grand Slam titles does Novak Djokovic have?\n\
    \n\
    Question: {query_str}\n\
    Knowledge source context: {context_str}\n\
    Previous reasoning: {prev_reasoning}\n\
    New question: ";

/// Question-answering prompt: `context_str`, `query_str` -> answer.
pub fn text_qa_prompt() -> PromptTemplate {
    PromptTemplate::new(TEXT_QA_TMPL)
}

/// Refine prompt: `query_str`, `existing_answer`, `context_msg` ->
/// possibly-updated answer. Instructs the model to return the existing
/// answer unchanged when the new context is not useful.
pub fn refine_prompt() -> PromptTemplate {
    PromptTemplate::new(REFINE_TMPL)
}

/// Document-side keyword extraction: `max_keywords`, `text`.
pub fn keyword_extract_prompt() -> PromptTemplate {
    PromptTemplate::new(KEYWORD_EXTRACT_TMPL)
}

/// Query-side keyword extraction: `max_keywords`, `question`.
pub fn query_keyword_extract_prompt() -> PromptTemplate {
    PromptTemplate::new(QUERY_KEYWORD_EXTRACT_TMPL)
}

/// Multi-step decomposition: `query_str`, `context_str`, `prev_reasoning` ->
/// next sub-question, or the literal 'None' when the source is exhausted.
pub fn step_decompose_prompt() -> PromptTemplate {
    PromptTemplate::new(STEP_DECOMPOSE_TMPL)
}
