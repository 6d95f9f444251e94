use crate::schema::{
    employees, frontdesk_reports, menu_items, otp_codes, report_notifications, roles,
    room_amenities, room_amenities_mapping, room_maintenance_log, room_types, rooms,
};
use chrono::NaiveDateTime;
use diesel::{pg::Pg, Insertable, Queryable, Selectable};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

#[derive(ToSchema, Serialize, Selectable, Queryable, Default, Debug)]
#[diesel(table_name = roles)]
#[diesel(check_for_backend(Pg))]
pub struct Role {
    pub role_id: i32,
    pub role_name: String,
}

#[derive(Selectable, Queryable, Debug)]
#[diesel(table_name = employees)]
#[diesel(belongs_to(Role))]
#[diesel(check_for_backend(Pg))]
pub struct Employee {
    pub employee_id: i32,
    pub full_name: String,
    pub email: String,
    pub password_hash: String,
    pub role_id: Option<i32>,
    pub mfa_enabled: bool,
    pub is_active: Option<bool>,
    pub created_at: Option<NaiveDateTime>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = employees)]
pub struct EmployeeInsert {
    pub full_name: String,
    pub email: String,
    pub password_hash: String,
    pub role_id: Option<i32>,
    pub mfa_enabled: bool,
    pub is_active: Option<bool>,
}

#[derive(ToSchema, Serialize, Selectable, Queryable, Default, Debug)]
#[diesel(table_name = room_types)]
#[diesel(check_for_backend(Pg))]
pub struct RoomType {
    pub room_type_id: i32,
    pub type_name: String,
    pub description: Option<String>,
    pub base_rate: f64,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = room_types)]
pub struct RoomTypeInsert {
    pub type_name: String,
    pub description: Option<String>,
    pub base_rate: f64,
}

#[derive(ToSchema, Serialize, Selectable, Queryable, Default, Debug)]
#[diesel(table_name = rooms)]
#[diesel(check_for_backend(Pg))]
pub struct Room {
    pub room_id: i32,
    pub room_number: String,
    pub room_type_id: i32,
    pub status_id: i32,
    pub floor: i32,
    pub notes: Option<String>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = rooms)]
pub struct RoomInsert {
    pub room_number: String,
    pub room_type_id: i32,
    pub status_id: i32,
    pub floor: i32,
    pub notes: Option<String>,
}

#[derive(ToSchema, Serialize, Selectable, Queryable, Default, Debug)]
#[diesel(table_name = room_amenities)]
#[diesel(check_for_backend(Pg))]
pub struct Amenity {
    pub amenity_id: i32,
    pub amenity_name: String,
    pub is_active: bool,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = room_amenities_mapping)]
pub struct AmenityMapping {
    pub room_id: i32,
    pub amenity_id: i32,
}

#[derive(ToSchema, Serialize, Selectable, Queryable, Default, Debug)]
#[diesel(table_name = menu_items)]
#[diesel(check_for_backend(Pg))]
pub struct MenuItem {
    pub item_id: i32,
    pub item_name: String,
    pub category: String,
    pub price: f64,
    pub is_available: bool,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = menu_items)]
pub struct MenuItemInsert {
    pub item_name: String,
    pub category: String,
    pub price: f64,
    pub is_available: bool,
}

#[derive(ToSchema, Serialize, Selectable, Queryable, Default, Debug)]
#[diesel(table_name = room_maintenance_log)]
#[diesel(check_for_backend(Pg))]
pub struct MaintenanceLog {
    pub log_id: i32,
    pub room_id: i32,
    pub reported_by: Option<i32>,
    pub issue: String,
    pub status_id: i32,
    pub reported_at: NaiveDateTime,
    pub resolved_at: Option<NaiveDateTime>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = room_maintenance_log)]
pub struct MaintenanceLogInsert {
    pub room_id: i32,
    pub reported_by: Option<i32>,
    pub issue: String,
    pub status_id: i32,
}

#[derive(ToSchema, Serialize, Selectable, Queryable, Default, Debug)]
#[diesel(table_name = frontdesk_reports)]
#[diesel(check_for_backend(Pg))]
pub struct FrontdeskReport {
    pub report_id: i32,
    pub author_id: Option<i32>,
    pub shift: String,
    pub summary: String,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = frontdesk_reports)]
pub struct FrontdeskReportInsert {
    pub author_id: Option<i32>,
    pub shift: String,
    pub summary: String,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = report_notifications)]
pub struct NotificationInsert {
    pub report_id: i32,
    pub recipient_id: i32,
}

#[derive(Selectable, Queryable, Debug)]
#[diesel(table_name = otp_codes)]
#[diesel(check_for_backend(Pg))]
pub struct OtpCode {
    pub otp_id: i32,
    pub employee_id: i32,
    pub purpose: String,
    pub code: String,
    pub expires_at: NaiveDateTime,
    pub consumed: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = otp_codes)]
pub struct OtpInsert {
    pub employee_id: i32,
    pub purpose: String,
    pub code: String,
    pub expires_at: NaiveDateTime,
}

#[derive(Deserialize, ToSchema)]
pub struct EntityId {
    pub id: i32,
}

/// Plain `{success, message}` envelope shared by write endpoints.
#[derive(Serialize, ToSchema, Debug)]
pub struct StatusResponse {
    pub success: bool,
    pub message: String,
}

impl StatusResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

#[derive(ToSchema, Deserialize, Debug, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(ToSchema, Deserialize, Debug, Validate)]
pub struct OtpRequest {
    #[validate(length(equal = 6, message = "Code must be 6 digits"))]
    pub code: String,
}

#[derive(ToSchema, Deserialize, Debug, Validate)]
pub struct ForgotPasswordRequest {
    #[validate(email)]
    pub email: String,
}

#[derive(ToSchema, Deserialize, Debug, Validate)]
pub struct VerifyResetRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(equal = 6, message = "Code must be 6 digits"))]
    pub code: String,
}

#[derive(ToSchema, Deserialize, Debug, Validate)]
pub struct ResetPasswordRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(equal = 6, message = "Code must be 6 digits"))]
    pub code: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub new_password: String,
}

fn default_amenities() -> Vec<i32> {
    Vec::new()
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Validate)]
pub struct NewRoom {
    #[validate(length(min = 1, max = 32, message = "Room number is required"))]
    pub room_number: String,
    pub room_type_id: i32,
    pub status_id: Option<i32>,
    pub floor: i32,
    pub notes: Option<String>,
    #[serde(default = "default_amenities")]
    pub amenities: Vec<i32>,
}

#[derive(ToSchema, Deserialize, Debug, Validate)]
pub struct BulkRooms {
    #[validate(length(min = 1, message = "At least one room is required"), nested)]
    pub rooms: Vec<NewRoom>,
}

#[derive(ToSchema, Deserialize, Debug, Validate)]
pub struct NewRoomType {
    #[validate(length(min = 1, message = "Type name is required"))]
    pub type_name: String,
    pub description: Option<String>,
    #[validate(range(min = 0.0, message = "Base rate cannot be negative"))]
    pub base_rate: f64,
}

#[derive(ToSchema, Deserialize, Debug, Validate)]
pub struct NewAmenity {
    #[validate(length(min = 1, message = "Amenity name is required"))]
    pub amenity_name: String,
}

fn default_true() -> bool {
    true
}

#[derive(ToSchema, Deserialize, Debug, Validate)]
pub struct NewMenuItem {
    #[validate(length(min = 1, message = "Item name is required"))]
    pub item_name: String,
    #[validate(length(min = 1, message = "Category is required"))]
    pub category: String,
    #[validate(range(min = 0.0, message = "Price cannot be negative"))]
    pub price: f64,
    #[serde(default = "default_true")]
    pub is_available: bool,
}

#[derive(ToSchema, Deserialize, Debug, Validate)]
pub struct NewMaintenance {
    pub room_id: i32,
    #[validate(length(min = 1, message = "Issue description is required"))]
    pub issue: String,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct MaintenanceUpdate {
    pub status_id: i32,
}

#[derive(ToSchema, Deserialize, Debug, Validate)]
pub struct NewStaff {
    #[validate(length(min = 1, message = "Full name is required"))]
    pub full_name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    pub role: String,
    #[serde(default)]
    pub mfa_enabled: bool,
}

#[derive(ToSchema, Deserialize, Debug, Validate)]
pub struct StaffUpdate {
    #[validate(length(min = 1, message = "Full name is required"))]
    pub full_name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: Option<String>,
    pub role: String,
    pub mfa_enabled: bool,
    pub is_active: bool,
}

#[derive(ToSchema, Deserialize, Debug, Validate)]
pub struct NewReport {
    #[validate(length(min = 1, max = 32, message = "Shift is required"))]
    pub shift: String,
    #[validate(length(min = 1, message = "Summary is required"))]
    pub summary: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_request_rejects_bad_email() {
        let req = LoginRequest {
            email: "not-an-email".into(),
            password: "secret".into(),
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn otp_request_requires_six_digits() {
        let short = OtpRequest { code: "123".into() };
        assert!(short.validate().is_err());
        let ok = OtpRequest {
            code: "123456".into(),
        };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn new_room_requires_room_number() {
        let room = NewRoom {
            room_number: String::new(),
            room_type_id: 1,
            status_id: None,
            floor: 2,
            notes: None,
            amenities: vec![],
        };
        assert!(room.validate().is_err());
    }

    #[test]
    fn bulk_rooms_validates_each_row() {
        let bulk = BulkRooms {
            rooms: vec![NewRoom {
                room_number: String::new(),
                room_type_id: 1,
                status_id: None,
                floor: 1,
                notes: None,
                amenities: vec![],
            }],
        };
        assert!(bulk.validate().is_err());
    }

    #[test]
    fn staff_update_password_is_optional() {
        let update = StaffUpdate {
            full_name: "Dana Reyes".into(),
            email: "dana@example.com".into(),
            password: None,
            role: "manager".into(),
            mfa_enabled: false,
            is_active: true,
        };
        assert!(update.validate().is_ok());
    }

    #[test]
    fn menu_item_price_cannot_be_negative() {
        let item = NewMenuItem {
            item_name: "Club sandwich".into(),
            category: "lunch".into(),
            price: -1.0,
            is_available: true,
        };
        assert!(item.validate().is_err());
    }
}
