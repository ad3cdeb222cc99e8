//! 数据模型
//! 客户端表单与校验规则

pub mod forms;

pub use forms::{InquiryForm, LoginForm, RegistrationForm, TemplateForm};
