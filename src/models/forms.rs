//! 表单模型与客户端校验

use common::{ApplicationRequest, RegistrationRequest, TemplatePayload};
use serde::Deserialize;
use validator::{Validate, ValidationError};

/// 登录表单
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginForm {
    #[validate(length(min = 1, max = 255, message = "is required"))]
    pub username: String,

    #[validate(length(min = 1, message = "is required"))]
    pub password: String,
}

/// 注册表单
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegistrationForm {
    #[validate(length(min = 3, max = 64, message = "must be 3-64 characters"))]
    pub username: String,

    #[validate(email(message = "must be a valid email address"))]
    pub email: String,

    #[validate(length(min = 8, max = 128, message = "must be at least 8 characters"))]
    pub password: String,

    #[validate(must_match(other = "password", message = "does not match the password"))]
    pub password_confirmation: String,

    #[serde(default)]
    pub first_name: Option<String>,

    #[serde(default)]
    pub last_name: Option<String>,
}

impl RegistrationForm {
    pub fn to_request(&self) -> RegistrationRequest {
        RegistrationRequest {
            username: self.username.trim().to_string(),
            email: self.email.trim().to_string(),
            password: self.password.clone(),
            first_name: trimmed(&self.first_name),
            last_name: trimmed(&self.last_name),
        }
    }

    pub fn login_form(&self) -> LoginForm {
        LoginForm {
            username: self.username.trim().to_string(),
            password: self.password.clone(),
        }
    }
}

/// 购买咨询表单，邮箱和电话至少填一个
#[derive(Debug, Clone, Deserialize, Validate)]
#[validate(schema(function = "validate_contact"))]
pub struct InquiryForm {
    #[validate(range(min = 1, message = "must reference a template"))]
    pub template_id: i64,

    #[validate(length(min = 1, max = 128, message = "is required"))]
    pub name: String,

    #[serde(default)]
    #[validate(email(message = "must be a valid email address"))]
    pub email: Option<String>,

    #[serde(default)]
    #[validate(custom(function = "validate_phone"))]
    pub phone: Option<String>,

    #[serde(default)]
    #[validate(length(max = 2000, message = "must be at most 2000 characters"))]
    pub message: Option<String>,
}

impl InquiryForm {
    pub fn to_request(&self) -> ApplicationRequest {
        ApplicationRequest {
            template_id: self.template_id,
            name: self.name.trim().to_string(),
            email: trimmed(&self.email),
            phone: trimmed(&self.phone),
            message: trimmed(&self.message),
        }
    }
}

/// 模板编辑表单（管理员）
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct TemplateForm {
    #[validate(length(min = 1, max = 255, message = "is required"))]
    pub title: String,

    #[serde(default)]
    #[validate(length(max = 5000, message = "must be at most 5000 characters"))]
    pub description: Option<String>,

    #[validate(range(min = 0.0, message = "must not be negative"))]
    pub price: f64,

    #[validate(range(exclusive_min = 0.0, message = "must be positive"))]
    pub area: f64,

    #[validate(range(min = 1, max = 5, message = "must be between 1 and 5"))]
    pub floors: u32,

    #[validate(range(min = 1, message = "must be at least 1"))]
    pub rooms: u32,
}

impl TemplateForm {
    pub fn to_payload(&self) -> TemplatePayload {
        TemplatePayload {
            title: self.title.trim().to_string(),
            description: trimmed(&self.description),
            price: self.price,
            area: self.area,
            floors: self.floors,
            rooms: self.rooms,
        }
    }
}

fn trimmed(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn validate_phone(phone: &str) -> Result<(), ValidationError> {
    let digits = phone.chars().filter(char::is_ascii_digit).count();
    let allowed = phone
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | ' ' | '(' | ')'));

    if allowed && (10..=15).contains(&digits) {
        Ok(())
    } else {
        let mut err = ValidationError::new("phone");
        err.message = Some("must be a valid phone number".into());
        Err(err)
    }
}

fn validate_contact(form: &InquiryForm) -> Result<(), ValidationError> {
    if trimmed(&form.email).is_none() && trimmed(&form.phone).is_none() {
        let mut err = ValidationError::new("contact");
        err.message = Some("email or phone is required".into());
        return Err(err);
    }
    Ok(())
}
