pub mod ai_ethics_survey;
