//! Canned prompt builders for the two record shapes
//!
//! The prompts insist on a bare JSON array with no markdown so the fast
//! parse path usually succeeds; the recovery chain handles the cases where
//! the provider ignores that anyway.

/// Build the conversational prompt asking for preference questions
pub fn questions_prompt(project_name: &str, description: &str, stack: &str) -> String {
    format!(
        r#"Generate exactly 15 personalized preference questions for building a {stack} project.

Project: "{project_name}" - {description}

You are having a conversation with a user to understand their project needs. Ask questions in a friendly, conversational way using "you" and "your".

Cover these 15 areas (authentication, database, UI framework, color theme, API type, state management, forms, file uploads, real-time features, deployment, testing, error tracking, analytics, email, payments).

CRITICAL: Respond ONLY with valid JSON array. No markdown, no explanations.

Format:
[
  {{
    "key": "auth_preference",
    "question": "What authentication system do you want for your app?",
    "options": ["JWT tokens", "OAuth (Google/GitHub)", "Email/Password", "No authentication"]
  }}
]

Return ONLY the JSON array. START with [ and END with ]."#
    )
}

/// Build the bulk prompt asking for a complete project file set
pub fn files_prompt(
    project_name: &str,
    description: &str,
    stack: &str,
    answers_json: &str,
    theme_json: &str,
) -> String {
    format!(
        r#"You are an expert {stack} developer. Generate a complete project structure.

Project: "{project_name}"
Description: "{description}"
Stack: {stack}
User Preferences: {answers_json}
Theme: {theme_json}

Generate 10-15 essential files for a complete, working {stack} application.

Include backend files (server.js, models, routes, package.json), frontend files (App.jsx, components, package.json), README.md, and .gitignore.

CRITICAL: Respond ONLY with valid JSON array. No markdown, no explanations. ENSURE ALL STRINGS ARE PROPERLY TERMINATED.

Format:
[
  {{
    "filename": "backend/server.js",
    "content": "import express from 'express';\nconst app = express();\n// complete code here"
  }}
]

IMPORTANT: Make sure every string is complete and properly closed with quotes. Return ONLY the JSON array. START with [ and END with ]."#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_questions_prompt_mentions_project() {
        let prompt = questions_prompt("Taskly", "a todo app", "MERN");
        assert!(prompt.contains("\"Taskly\" - a todo app"));
        assert!(prompt.contains("MERN project"));
        assert!(prompt.contains("ONLY the JSON array"));
    }

    #[test]
    fn test_files_prompt_embeds_preferences() {
        let prompt = files_prompt("Taskly", "a todo app", "MERN", r#"{"auth":"JWT"}"#, "{}");
        assert!(prompt.contains(r#"{"auth":"JWT"}"#));
        assert!(prompt.contains("10-15 essential files"));
    }
}
