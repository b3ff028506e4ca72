use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use chrono::Utc;
use itertools::Itertools;

use crate::{
    database::models::{
        favorite::Favorite,
        follow::Follow,
        ingredient::{Ingredient, NewIngredient},
        ingredient_recipe::IngredientRecipe,
        recipe::Recipe,
        recipe_tag::RecipeTag,
        shopping_cart::ShoppingCartEntry,
        tag::Tag,
        user::User,
    },
    shopping_list::CartLine,
};

use super::recipe_store::{Page, RecipeDraft, RecipeFilter, RecipeIngredient, RecipeStore, StoreError};

#[derive(Default)]
struct Tables {
    next_id: i32,
    users: BTreeMap<i32, User>,
    tokens: HashMap<String, i32>,
    tags: BTreeMap<i32, Tag>,
    ingredients: BTreeMap<i32, Ingredient>,
    recipes: BTreeMap<i32, Recipe>,
    recipe_tags: Vec<RecipeTag>,
    ingredient_recipes: Vec<IngredientRecipe>,
    favorites: HashSet<Favorite>,
    shopping_carts: Vec<ShoppingCartEntry>,
    follows: Vec<Follow>,
}

impl Tables {
    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }

    fn check_links(&self, draft: &RecipeDraft) -> Result<(), StoreError> {
        let tags_exist = draft.tags.iter().all(|id| self.tags.contains_key(id));
        let ingredients_exist = draft
            .ingredients
            .iter()
            .all(|(id, _)| self.ingredients.contains_key(id));

        if tags_exist && ingredients_exist {
            Ok(())
        } else {
            Err(StoreError::InvalidReference)
        }
    }

    fn replace_links(&mut self, recipe_id: i32, draft: &RecipeDraft) {
        self.recipe_tags.retain(|link| link.recipe_id != recipe_id);
        self.ingredient_recipes.retain(|line| line.recipe_id != recipe_id);

        self.recipe_tags
            .extend(draft.tags.iter().map(|tag_id| RecipeTag::new(recipe_id, *tag_id)));
        self.ingredient_recipes.extend(
            draft
                .ingredients
                .iter()
                .map(|(ingredient_id, amount)| IngredientRecipe::new(recipe_id, *ingredient_id, *amount)),
        );
    }

    fn recipe_exists(&self, recipe_id: i32) -> Result<(), StoreError> {
        if self.recipes.contains_key(&recipe_id) {
            Ok(())
        } else {
            Err(StoreError::InvalidReference)
        }
    }

    fn newest_first(&self, recipes: impl Iterator<Item = Recipe>) -> Vec<Recipe> {
        recipes
            .sorted_by(|a, b| b.pub_date.cmp(&a.pub_date).then(b.id.cmp(&a.id)))
            .collect_vec()
    }
}

const DEFAULT_TAGS: [(&str, &str, &str); 3] = [
    ("Breakfast", "#E26C2D", "breakfast"),
    ("Lunch", "#49B64E", "lunch"),
    ("Dinner", "#8775D2", "dinner"),
];

/// In-memory [`RecipeStore`] for tests and the `memory` backend.
///
/// Every operation holds one lock over all tables, so check-then-insert is atomic.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store ready for a demo run: the default tags, the given ingredients and,
    /// when `demo` names a `(username, token)` pair, one active user holding that token.
    pub fn with_demo_data(ingredients: &[NewIngredient], demo: Option<(&str, &str)>) -> Result<Self, StoreError> {
        let store = Self::new();

        for (name, color, slug) in DEFAULT_TAGS {
            store.insert_tag(name, color, slug);
        }
        store.replace_ingredients(ingredients)?;

        if let Some((username, token)) = demo {
            let user = store.insert_user(username, false);
            store.insert_token(token, user.id);
        }

        Ok(store)
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert_user(&self, username: &str, is_staff: bool) -> User {
        let mut tables = self.tables();
        let user = User {
            id: tables.next_id(),
            username: username.to_owned(),
            email: format!("{username}@example.com"),
            first_name: username.to_owned(),
            last_name: String::new(),
            is_active: true,
            is_staff,
        };
        tables.users.insert(user.id, user.clone());
        user
    }

    #[cfg(test)]
    pub fn set_active(&self, user_id: i32, is_active: bool) {
        if let Some(user) = self.tables().users.get_mut(&user_id) {
            user.is_active = is_active;
        }
    }

    pub fn insert_token(&self, key: &str, user_id: i32) {
        self.tables().tokens.insert(key.to_owned(), user_id);
    }

    pub fn insert_tag(&self, name: &str, color: &str, slug: &str) -> Tag {
        let mut tables = self.tables();
        let tag = Tag {
            id: tables.next_id(),
            name: name.to_owned(),
            color: color.to_owned(),
            slug: slug.to_owned(),
        };
        tables.tags.insert(tag.id, tag.clone());
        tag
    }

    #[cfg(test)]
    pub fn insert_ingredient(&self, name: &str, measurement_unit: &str) -> Ingredient {
        let mut tables = self.tables();
        let ingredient = Ingredient {
            id: tables.next_id(),
            name: name.to_owned(),
            measurement_unit: measurement_unit.to_owned(),
        };
        tables.ingredients.insert(ingredient.id, ingredient.clone());
        ingredient
    }

    /// Inserts a recipe without tags, bypassing payload validation.
    #[cfg(test)]
    pub fn insert_recipe(&self, author_id: i32, name: &str, ingredients: &[(i32, f64)]) -> Recipe {
        let mut tables = self.tables();
        let recipe = Recipe {
            id: tables.next_id(),
            author_id,
            name: name.to_owned(),
            text: String::new(),
            image: String::new(),
            cooking_time: 1,
            pub_date: Utc::now(),
        };
        tables.recipes.insert(recipe.id, recipe.clone());
        tables.ingredient_recipes.extend(
            ingredients
                .iter()
                .map(|(ingredient_id, amount)| IngredientRecipe::new(recipe.id, *ingredient_id, *amount)),
        );
        recipe
    }
}

impl RecipeStore for MemoryStore {
    fn user_by_token(&self, key: &str) -> Result<Option<User>, StoreError> {
        let guard = self.tables();
        let tables = &*guard;
        Ok(tables
            .tokens
            .get(key)
            .and_then(|user_id| tables.users.get(user_id))
            .cloned())
    }

    fn user(&self, id: i32) -> Result<Option<User>, StoreError> {
        Ok(self.tables().users.get(&id).cloned())
    }

    fn tags(&self) -> Result<Vec<Tag>, StoreError> {
        Ok(self
            .tables()
            .tags
            .values()
            .sorted_by(|a, b| b.name.cmp(&a.name))
            .cloned()
            .collect())
    }

    fn tag(&self, id: i32) -> Result<Option<Tag>, StoreError> {
        Ok(self.tables().tags.get(&id).cloned())
    }

    fn ingredients(&self, name_prefix: Option<&str>) -> Result<Vec<Ingredient>, StoreError> {
        let prefix = name_prefix.map(str::to_lowercase);
        Ok(self
            .tables()
            .ingredients
            .values()
            .filter(|ingredient| {
                prefix
                    .as_deref()
                    .map_or(true, |prefix| ingredient.name.to_lowercase().starts_with(prefix))
            })
            .sorted_by(|a, b| b.name.cmp(&a.name))
            .cloned()
            .collect())
    }

    fn ingredient(&self, id: i32) -> Result<Option<Ingredient>, StoreError> {
        Ok(self.tables().ingredients.get(&id).cloned())
    }

    fn replace_ingredients(&self, ingredients: &[NewIngredient]) -> Result<usize, StoreError> {
        let mut tables = self.tables();
        tables.ingredients.clear();
        tables.ingredient_recipes.clear();

        for new in ingredients {
            let id = tables.next_id();
            tables.ingredients.insert(
                id,
                Ingredient {
                    id,
                    name: new.name.clone(),
                    measurement_unit: new.measurement_unit.clone(),
                },
            );
        }

        Ok(ingredients.len())
    }

    fn recipes(&self, filter: &RecipeFilter, page: Page) -> Result<(Vec<Recipe>, i64), StoreError> {
        let guard = self.tables();
        let tables = &*guard;

        let tag_ids: HashSet<i32> = tables
            .tags
            .values()
            .filter(|tag| filter.tags.contains(&tag.slug))
            .map(|tag| tag.id)
            .collect();

        let matching = tables.recipes.values().filter(|recipe| {
            filter.author.map_or(true, |author| recipe.author_id == author)
                && (filter.tags.is_empty()
                    || tables
                        .recipe_tags
                        .iter()
                        .any(|link| link.recipe_id == recipe.id && tag_ids.contains(&link.tag_id)))
                && filter
                    .favorited_by
                    .map_or(true, |user_id| tables.favorites.contains(&Favorite::new(user_id, recipe.id)))
                && filter.in_cart_of.map_or(true, |user_id| {
                    tables
                        .shopping_carts
                        .contains(&ShoppingCartEntry::new(user_id, recipe.id))
                })
        });

        let sorted = tables.newest_first(matching.cloned());
        let count = sorted.len() as i64;
        let recipes = sorted
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .collect();

        Ok((recipes, count))
    }

    fn recipe(&self, id: i32) -> Result<Option<Recipe>, StoreError> {
        Ok(self.tables().recipes.get(&id).cloned())
    }

    fn recipe_tags(&self, recipe_id: i32) -> Result<Vec<Tag>, StoreError> {
        let guard = self.tables();
        let tables = &*guard;
        Ok(tables
            .recipe_tags
            .iter()
            .filter(|link| link.recipe_id == recipe_id)
            .filter_map(|link| tables.tags.get(&link.tag_id))
            .sorted_by_key(|tag| tag.id)
            .cloned()
            .collect())
    }

    fn recipe_ingredients(&self, recipe_id: i32) -> Result<Vec<RecipeIngredient>, StoreError> {
        let guard = self.tables();
        let tables = &*guard;
        Ok(tables
            .ingredient_recipes
            .iter()
            .filter(|line| line.recipe_id == recipe_id)
            .filter_map(|line| {
                tables.ingredients.get(&line.ingredient_id).map(|ingredient| RecipeIngredient {
                    ingredient: ingredient.clone(),
                    amount: line.amount,
                })
            })
            .collect())
    }

    fn recipes_by_author(&self, author_id: i32, limit: Option<i64>) -> Result<(Vec<Recipe>, i64), StoreError> {
        let guard = self.tables();
        let tables = &*guard;
        let recipes = tables.newest_first(
            tables
                .recipes
                .values()
                .filter(|recipe| recipe.author_id == author_id)
                .cloned(),
        );
        let count = recipes.len() as i64;
        let limit = limit.map_or(recipes.len(), |limit| limit.max(0) as usize);

        Ok((recipes.into_iter().take(limit).collect(), count))
    }

    fn create_recipe(&self, author_id: i32, draft: &RecipeDraft) -> Result<Recipe, StoreError> {
        let mut tables = self.tables();
        if !tables.users.contains_key(&author_id) {
            return Err(StoreError::InvalidReference);
        }
        tables.check_links(draft)?;

        let recipe = Recipe {
            id: tables.next_id(),
            author_id,
            name: draft.name.clone(),
            text: draft.text.clone(),
            image: draft.image.clone().unwrap_or_default(),
            cooking_time: draft.cooking_time,
            pub_date: Utc::now(),
        };
        tables.recipes.insert(recipe.id, recipe.clone());
        tables.replace_links(recipe.id, draft);

        Ok(recipe)
    }

    fn update_recipe(&self, id: i32, draft: &RecipeDraft) -> Result<Recipe, StoreError> {
        let mut tables = self.tables();
        tables.check_links(draft)?;

        let recipe = tables.recipes.get_mut(&id).ok_or(StoreError::NotFound)?;
        recipe.name = draft.name.clone();
        recipe.text = draft.text.clone();
        if let Some(image) = &draft.image {
            recipe.image = image.clone();
        }
        recipe.cooking_time = draft.cooking_time;
        let recipe = recipe.clone();

        tables.replace_links(id, draft);

        Ok(recipe)
    }

    fn delete_recipe(&self, id: i32) -> Result<(), StoreError> {
        let mut tables = self.tables();
        tables.recipes.remove(&id).ok_or(StoreError::NotFound)?;

        tables.recipe_tags.retain(|link| link.recipe_id != id);
        tables.ingredient_recipes.retain(|line| line.recipe_id != id);
        tables.favorites.retain(|favorite| favorite.recipe_id != id);
        tables.shopping_carts.retain(|entry| entry.recipe_id != id);

        Ok(())
    }

    fn add_favorite(&self, user_id: i32, recipe_id: i32) -> Result<(), StoreError> {
        let mut tables = self.tables();
        tables.recipe_exists(recipe_id)?;

        if tables.favorites.insert(Favorite::new(user_id, recipe_id)) {
            Ok(())
        } else {
            Err(StoreError::DuplicateEntry)
        }
    }

    fn remove_favorite(&self, user_id: i32, recipe_id: i32) -> Result<bool, StoreError> {
        Ok(self.tables().favorites.remove(&Favorite::new(user_id, recipe_id)))
    }

    fn is_favorited(&self, user_id: i32, recipe_id: i32) -> Result<bool, StoreError> {
        Ok(self.tables().favorites.contains(&Favorite::new(user_id, recipe_id)))
    }

    fn add_to_cart(&self, user_id: i32, recipe_id: i32) -> Result<(), StoreError> {
        let mut tables = self.tables();
        tables.recipe_exists(recipe_id)?;

        let entry = ShoppingCartEntry::new(user_id, recipe_id);
        if tables.shopping_carts.contains(&entry) {
            return Err(StoreError::DuplicateEntry);
        }
        tables.shopping_carts.push(entry);

        Ok(())
    }

    fn remove_from_cart(&self, user_id: i32, recipe_id: i32) -> Result<bool, StoreError> {
        let mut tables = self.tables();
        let before = tables.shopping_carts.len();
        tables
            .shopping_carts
            .retain(|entry| !(entry.user_id == user_id && entry.recipe_id == recipe_id));

        Ok(tables.shopping_carts.len() != before)
    }

    fn is_in_cart(&self, user_id: i32, recipe_id: i32) -> Result<bool, StoreError> {
        Ok(self
            .tables()
            .shopping_carts
            .contains(&ShoppingCartEntry::new(user_id, recipe_id)))
    }

    fn cart_lines(&self, user_id: i32) -> Result<Vec<CartLine>, StoreError> {
        let guard = self.tables();
        let tables = &*guard;
        Ok(tables
            .shopping_carts
            .iter()
            .filter(|entry| entry.user_id == user_id)
            .flat_map(|entry| {
                tables
                    .ingredient_recipes
                    .iter()
                    .filter(move |line| line.recipe_id == entry.recipe_id)
            })
            .filter_map(|line| {
                tables.ingredients.get(&line.ingredient_id).map(|ingredient| {
                    CartLine::new(ingredient.name.clone(), ingredient.measurement_unit.clone(), line.amount)
                })
            })
            .collect())
    }

    fn follow(&self, user_id: i32, author_id: i32) -> Result<(), StoreError> {
        if user_id == author_id {
            return Err(StoreError::SelfFollow);
        }
        let mut tables = self.tables();
        if !tables.users.contains_key(&author_id) {
            return Err(StoreError::InvalidReference);
        }

        let follow = Follow::new(user_id, author_id);
        if tables.follows.contains(&follow) {
            return Err(StoreError::DuplicateEntry);
        }
        tables.follows.push(follow);

        Ok(())
    }

    fn unfollow(&self, user_id: i32, author_id: i32) -> Result<bool, StoreError> {
        let mut tables = self.tables();
        let before = tables.follows.len();
        tables.follows.retain(|follow| *follow != Follow::new(user_id, author_id));

        Ok(tables.follows.len() != before)
    }

    fn is_following(&self, user_id: i32, author_id: i32) -> Result<bool, StoreError> {
        Ok(self.tables().follows.contains(&Follow::new(user_id, author_id)))
    }

    fn followed_authors(&self, user_id: i32, page: Page) -> Result<(Vec<User>, i64), StoreError> {
        let guard = self.tables();
        let tables = &*guard;
        let authors = tables
            .follows
            .iter()
            .filter(|follow| follow.user_id == user_id)
            .filter_map(|follow| tables.users.get(&follow.author_id))
            .sorted_by_key(|user| user.id)
            .cloned()
            .collect_vec();
        let count = authors.len() as i64;

        Ok((
            authors
                .into_iter()
                .skip(page.offset() as usize)
                .take(page.limit() as usize)
                .collect(),
            count,
        ))
    }
}
