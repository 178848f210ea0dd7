//! Generation prompts built from a user's profile.

use crate::llm::CompletionRequest;
use crate::profile::{ChoiceOption, Profile};

use super::Difficulty;

fn profile_lines(profile: &Profile) -> String {
    format!(
        "- Name: {}\n\
         - Gender: {}\n\
         - Age: {} years\n\
         - Height: {} cm\n\
         - Weight: {} kg\n\
         - Goal: {}\n\
         - Training location: {}\n\
         - Level: {}",
        profile.name,
        profile.gender.label(),
        profile.age,
        profile.height_cm,
        profile.weight_kg,
        profile.goal.label(),
        profile.training_location.label(),
        profile.level.label(),
    )
}

pub fn training_request(profile: &Profile, difficulty: Difficulty) -> CompletionRequest {
    let system = format!(
        "You are a personal fitness trainer. Create an individual one-day workout for this user:\n\n\
         {}\n\
         - Difficulty: {}\n\n\
         The workout must be safe, effective, balanced and suitable for the user's gender and age.\n\n\
         Answer format, one block per exercise:\n\
         - Exercise: [name]\n\
         - Sets: [number]\n\
         - Reps: [number]\n\
         - Weight: [recommended kg, if any]\n\
         - Note: [if needed]",
        profile_lines(profile),
        difficulty.describe(),
    );
    CompletionRequest::new(system, "Create a workout.")
}

pub fn food_request(profile: &Profile) -> CompletionRequest {
    let system = format!(
        "You are a personal nutritionist. Create an individual one-day meal plan for this user:\n\n\
         {}\n\n\
         The plan must be balanced, support the user's goal, be safe, and suit their age and gender.\n\n\
         Answer format:\n\
         - Breakfast: [description]\n\
         - Snack (optional): [description]\n\
         - Lunch: [description]\n\
         - Snack (optional): [description]\n\
         - Dinner: [description]\n\
         - Drinks: [if any]",
        profile_lines(profile),
    );
    CompletionRequest::new(system, "Create a meal plan.")
}
